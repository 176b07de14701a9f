pub mod agent;
pub mod chart;
pub mod profiler;
pub mod row_source;
pub mod search;
pub mod tools;
