pub mod apps;
pub mod bulk;
pub mod deploy;
pub mod one_click;
mod pool;
