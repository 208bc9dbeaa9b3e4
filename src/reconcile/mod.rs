pub mod apply;
pub mod audit;
pub mod backup;
pub mod config;
pub mod normalize;
pub mod plan;
pub mod scan;
pub mod util;
