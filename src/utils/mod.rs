// 工具模块 - 随机数与文本处理

pub mod random;
pub mod text;

pub use random::{RandomGenerator, WeightedItem};
