pub mod approval_service;
pub mod budget_calculator;
pub mod debt_calculator;
pub mod history;
pub mod image_validator;
pub mod ledger;

pub use approval_service::*;
pub use budget_calculator::*;
pub use debt_calculator::*;
pub use history::HistoryService;
pub use image_validator::validate_image_base64;
