//! `calamine` 驱动的点表导入器，产出 `PointDefinition` 记录。
//! 列索引布局为常见点表格式（序号/模块类型/位号/
//! 变量名/描述/数据类型/通信地址…），裁剪到新数据模型需要的字段。
//! 这里只实现 `DefinitionSource` trait 的一个具体适配器，Excel 单元格解析
//! 细节本身可替换。

use crate::error::AppError;
use crate::models::{ModuleType, PointDataType, PointDefinition};
use calamine::{open_workbook, Reader, Xlsx};
use chrono::Utc;
use std::path::Path;

pub const EXPECTED_COLUMNS: usize = 12;

/// 列索引：序号(0) 模块类型(1) 位号(2) 变量名(3) 描述(4) 数据类型(5)
/// 通信地址(6) 量程下限(7) 量程上限(8) 低低报(9) 低报(10) 高报(11) 高高报(12)
mod col {
    pub const MODULE_TYPE: usize = 1;
    pub const TAG: usize = 2;
    pub const VARIABLE_NAME: usize = 3;
    pub const DESCRIPTION: usize = 4;
    pub const DATA_TYPE: usize = 5;
    pub const PLC_ADDRESS: usize = 6;
    pub const RANGE_LOW: usize = 7;
    pub const RANGE_HIGH: usize = 8;
    pub const SLL: usize = 9;
    pub const SL: usize = 10;
    pub const SH: usize = 11;
    pub const SHH: usize = 12;
}

pub struct ExcelDefinitionSource {
    file_path: String,
    station_name: String,
}

impl ExcelDefinitionSource {
    pub fn new(file_path: impl Into<String>, station_name: impl Into<String>) -> Self {
        Self { file_path: file_path.into(), station_name: station_name.into() }
    }

    pub fn read_definitions(&self) -> crate::error::AppResult<Vec<PointDefinition>> {
        if !Path::new(&self.file_path).exists() {
            return Err(AppError::config(format!("文件不存在: {}", self.file_path)));
        }

        let mut workbook: Xlsx<_> =
            open_workbook(&self.file_path).map_err(|e| AppError::config(format!("无法打开Excel文件: {}", e)))?;

        let sheet_name = workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| AppError::config("Excel文件中没有工作表"))?;

        let range = workbook
            .worksheet_range(&sheet_name)
            .map_err(|e| AppError::config(format!("无法读取工作表: {}", e)))?;

        let import_time = Utc::now();
        let mut definitions = Vec::new();

        for (row_idx, row) in range.rows().enumerate() {
            if row_idx == 0 {
                continue; // 标题行
            }
            if row.len() <= col::SHH {
                log::warn!("第{}行列数不足（{}列），已跳过", row_idx + 1, row.len());
                continue;
            }
            match self.parse_row(row, import_time) {
                Ok(def) => definitions.push(def),
                Err(e) => log::error!("第{}行解析失败: {}", row_idx + 1, e),
            }
        }

        if definitions.is_empty() {
            return Err(AppError::config("Excel文件中没有有效的点位定义"));
        }
        Ok(definitions)
    }

    fn parse_row(
        &self,
        row: &[calamine::DataType],
        import_time: chrono::DateTime<Utc>,
    ) -> crate::error::AppResult<PointDefinition> {
        let module_type: ModuleType = row[col::MODULE_TYPE]
            .to_string()
            .trim()
            .parse()
            .map_err(AppError::config)?;
        let tag = row[col::TAG].to_string().trim().to_string();
        let variable_name = row[col::VARIABLE_NAME].to_string().trim().to_string();
        let description = row[col::DESCRIPTION].to_string().trim().to_string();
        let data_type = match row[col::DATA_TYPE].to_string().trim() {
            "Bool" | "BOOL" | "bool" => PointDataType::Bool,
            "Int" | "INT" | "int" => PointDataType::Int,
            _ => PointDataType::Float,
        };
        let plc_address = row[col::PLC_ADDRESS].to_string().trim().to_string();

        let mut definition = PointDefinition::new(
            self.station_name.clone(),
            variable_name,
            tag,
            description,
            module_type,
            data_type,
            plc_address,
            import_time,
        );

        definition.range_low = cell_f32(row, col::RANGE_LOW);
        definition.range_high = cell_f32(row, col::RANGE_HIGH);
        definition.sll.value = cell_f32(row, col::SLL);
        definition.sl.value = cell_f32(row, col::SL);
        definition.sh.value = cell_f32(row, col::SH);
        definition.shh.value = cell_f32(row, col::SHH);

        Ok(definition)
    }
}

impl crate::models::DefinitionSource for ExcelDefinitionSource {
    fn read_all(&self) -> crate::error::AppResult<Vec<PointDefinition>> {
        self.read_definitions()
    }
}

fn cell_f32(row: &[calamine::DataType], index: usize) -> Option<f32> {
    row.get(index).and_then(|cell| cell.get_float()).map(|v| v as f32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_returns_config_error() {
        let source = ExcelDefinitionSource::new("/nonexistent/points.xlsx", "S1");
        let err = source.read_definitions().unwrap_err();
        assert!(matches!(err, AppError::ConfigError { .. }));
    }
}
