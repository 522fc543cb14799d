//! 游戏核心逻辑模块（棋盘、规则判定、回合状态）。

pub mod board;
pub mod rules;
pub mod state;

pub use board::{Board, Cell, Coord, IntegrityError, Speculation};
pub use rules::{Direction, GappedRun, Outcome, RuleEngine, RuleError, Run};
pub use state::{
    GameConfig,
    GameMode,
    GamePhase,
    GameState,
    Player,
    DEFAULT_COLS,
    DEFAULT_CONNECT,
    DEFAULT_ROWS,
};
