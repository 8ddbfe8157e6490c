//! 作业助手：拍照识别作业题目，调用大模型解题并批改用户答案

pub mod app;
pub mod error;
pub mod export;
pub mod history;
pub mod image;
pub mod logger;
pub mod model;
pub mod normalize;
pub mod ocr;
pub mod settings;
pub mod solver;
pub mod storage;
pub mod transport;
pub mod utils;
pub mod vendor;
pub mod workflow;

pub use error::{HelperError, Result};
