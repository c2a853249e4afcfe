//! `fat-enginectl` — 驱动 `Orchestrator` 命令面的瘦CLI外壳。
//! 退出码映射：0=全部通过 1=存在失败 2=配置/连接错误 3=已取消。

use clap::{Parser, Subcommand};
use fat_engine::config::EngineConfig;
use fat_engine::events::BroadcastEventPublisher;
use fat_engine::excel::ExcelDefinitionSource;
use fat_engine::models::DefinitionSource;
use fat_engine::orchestrator::Orchestrator;
use fat_engine::plc::{ModbusPlcLink, PlcLink};
use fat_engine::store::{SqliteStore, Store};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "fat-enginectl", about = "双PLC工厂验收测试执行引擎命令行")]
struct Cli {
    /// 配置文件路径（TOML/JSON/YAML）
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// SQLite 数据库文件路径，默认 ./fat_engine.sqlite
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// 从Excel点表导入定义
    Import {
        #[arg(long)]
        file: PathBuf,
        #[arg(long)]
        station: String,
    },
    /// 为某个站点生成新批次（基于已导入的定义）
    Allocate {
        #[arg(long)]
        station: String,
    },
    /// 列出已有批次
    ListBatches,
    /// 连接两条PLC链路
    ConnectPlc,
    /// 确认接线，创建任务集合
    ConfirmWiring {
        #[arg(long)]
        batch_id: String,
    },
    /// 启动批次自动测试
    Start {
        #[arg(long)]
        batch_id: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::from(2)
        }
    }
}

async fn run(cli: Cli) -> fat_engine::AppResult<ExitCode> {
    let config = EngineConfig::load(cli.config.as_deref())?;

    let db_path = cli.db.or_else(|| config.database_path.clone().map(PathBuf::from));
    let store: Arc<dyn Store> = Arc::new(SqliteStore::new(db_path.as_deref()).await?);
    let events = Arc::new(BroadcastEventPublisher::default());

    let test_link: Arc<dyn PlcLink> = Arc::new(ModbusPlcLink::new(config.test_plc.clone().into()));
    let target_link: Arc<dyn PlcLink> = Arc::new(ModbusPlcLink::new(config.target_plc.clone().into()));

    let orchestrator = Orchestrator::new(store, events, test_link, target_link);

    let code = match cli.command {
        Command::Import { file, station } => {
            let source = ExcelDefinitionSource::new(file.to_string_lossy().to_string(), station);
            let definitions = source.read_all()?;
            let count = definitions.len();
            orchestrator.import(definitions).await?;
            println!("导入了 {} 条点位定义", count);
            ExitCode::from(0)
        }
        Command::Allocate { station } => {
            let pool = config.channel_pool()?;
            let batch = orchestrator.allocate(&station, chrono::Utc::now(), &pool).await?;
            println!("批次已创建: {} ({})", batch.batch_id, batch.batch_name);
            ExitCode::from(0)
        }
        Command::ListBatches => {
            for batch in orchestrator.list_batches().await? {
                println!(
                    "{}  {}  total={} tested={} passed={} failed={} skipped={}",
                    batch.batch_id, batch.batch_name, batch.total_points, batch.tested, batch.passed, batch.failed, batch.skipped
                );
            }
            ExitCode::from(0)
        }
        Command::ConnectPlc => match orchestrator.connect_plc().await {
            Ok(()) => {
                println!("两条PLC链路已连接");
                ExitCode::from(0)
            }
            Err(e) => {
                log::error!("PLC连接失败: {}", e);
                ExitCode::from(2)
            }
        },
        Command::ConfirmWiring { batch_id } => {
            orchestrator.confirm_wiring(&batch_id).await?;
            println!("接线已确认");
            ExitCode::from(0)
        }
        Command::Start { batch_id } => {
            let outcome = orchestrator.start_batch_auto_test(&batch_id).await?;
            ExitCode::from(outcome.exit_code() as u8)
        }
    };

    orchestrator.shutdown().await;
    Ok(code)
}
