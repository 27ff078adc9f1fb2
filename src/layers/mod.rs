/// Network building blocks
pub mod residual;

pub use residual::ResidualBlock;
