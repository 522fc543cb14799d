//! 电脑玩家（启发式选列）。

pub mod heuristic;

pub use heuristic::{score_columns, AiAgent, AiDecision, ColumnScore, Priority};
