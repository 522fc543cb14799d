use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::{
    board::{Board, Cell, Coord, IntegrityError},
    rules::{Outcome, RuleEngine, RuleError},
};
use crate::utils::console_log;

pub const DEFAULT_ROWS: usize = 5;
pub const DEFAULT_COLS: usize = 7;
pub const DEFAULT_CONNECT: usize = 4;

/// 玩家：红方先手记为 PlayerA，蓝方为 PlayerB。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Player {
    Red,
    Blue,
}

impl Player {
    pub fn opponent(self) -> Self {
        match self {
            Player::Red => Player::Blue,
            Player::Blue => Player::Red,
        }
    }

    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        if rng.gen::<bool>() {
            Player::Red
        } else {
            Player::Blue
        }
    }

    pub fn code(self) -> u8 {
        Cell::from(self).code()
    }
}

impl fmt::Display for Player {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Player::Red => f.write_str("Red"),
            Player::Blue => f.write_str("Blue"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GameMode {
    PlayerVsPlayer,
    PlayerVsComputer,
}

impl Default for GameMode {
    fn default() -> Self {
        GameMode::PlayerVsComputer
    }
}

impl FromStr for GameMode {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pvp" | "player_vs_player" => Ok(GameMode::PlayerVsPlayer),
            "pvai" | "pvc" | "player_vs_computer" => Ok(GameMode::PlayerVsComputer),
            _ => Err(RuleError::UnknownMode {
                mode: s.to_string(),
            }),
        }
    }
}

/// 构造引擎时的配置，可由前端以 JSON 传入。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GameConfig {
    pub rows: usize,
    pub cols: usize,
    pub connect: usize,
    pub mode: GameMode,
    pub computer: Player,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl GameConfig {
    pub fn validate(&self) -> Result<(), RuleError> {
        if self.rows == 0 || self.cols == 0 {
            return Err(RuleError::InvalidDimensions {
                rows: self.rows,
                cols: self.cols,
            });
        }
        if self.connect < 2 {
            return Err(RuleError::InvalidConnectLength {
                connect: self.connect,
            });
        }
        Ok(())
    }

    pub fn with_mode(mut self, mode: GameMode) -> Self {
        self.mode = mode;
        self
    }
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            rows: DEFAULT_ROWS,
            cols: DEFAULT_COLS,
            connect: DEFAULT_CONNECT,
            mode: GameMode::default(),
            computer: Player::Blue,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum GamePhase {
    AwaitingMove,
    GameOver,
}

impl Default for GamePhase {
    fn default() -> Self {
        Self::AwaitingMove
    }
}

/// 一局棋的完整状态：棋盘、轮次、阶段以及等待判定的落子。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameState {
    pub board: Board,
    pub current_player: Player,
    #[serde(default)]
    pub phase: GamePhase,
    pub connect: usize,
    #[serde(default)]
    pub mode: GameMode,
    pub computer: Player,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending: Option<Coord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
}

impl GameState {
    pub fn new<R: Rng + ?Sized>(config: &GameConfig, rng: &mut R) -> Result<Self, RuleError> {
        config.validate()?;
        Ok(Self {
            board: Board::new(config.rows, config.cols)?,
            current_player: Player::random(rng),
            phase: GamePhase::AwaitingMove,
            connect: config.connect,
            mode: config.mode,
            computer: config.computer,
            pending: None,
            outcome: None,
        })
    }

    /// 用默认连子数与模式包装一个现成局面。
    pub fn from_board(board: Board, current_player: Player) -> Self {
        let config = GameConfig::default();
        Self {
            board,
            current_player,
            phase: GamePhase::AwaitingMove,
            connect: config.connect,
            mode: config.mode,
            computer: config.computer,
            pending: None,
            outcome: None,
        }
    }

    pub fn with_mode(mut self, mode: GameMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_connect(mut self, connect: usize) -> Self {
        self.connect = connect;
        self
    }

    /// 在 `rows x cols` 的空棋盘上重新开局。
    pub fn reset<R: Rng + ?Sized>(
        &mut self,
        rows: usize,
        cols: usize,
        rng: &mut R,
    ) -> Result<(), RuleError> {
        if rows == self.board.rows() && cols == self.board.cols() {
            self.board.reset();
        } else {
            self.board = Board::new(rows, cols)?;
        }
        self.current_player = Player::random(rng);
        self.phase = GamePhase::AwaitingMove;
        self.pending = None;
        self.outcome = None;
        Ok(())
    }

    pub fn is_finished(&self) -> bool {
        self.phase == GamePhase::GameOver
    }

    pub fn current_player(&self) -> Player {
        self.current_player
    }

    /// 最近一枚棋子的归属，供下落动画着色。
    pub fn last_mover(&self) -> Player {
        match self.outcome {
            Some(Outcome::Win { winner, .. }) => winner,
            _ => self.current_player.opponent(),
        }
    }

    pub fn is_computer_turn(&self) -> bool {
        self.mode == GameMode::PlayerVsComputer
            && !self.is_finished()
            && self.current_player == self.computer
    }

    pub fn ensure_column(&self, col: usize) -> Result<(), RuleError> {
        if !self.board.column_in_range(col) {
            return Err(RuleError::ColumnOutOfRange {
                col,
                cols: self.board.cols(),
            });
        }
        Ok(())
    }

    pub fn ensure_cell(&self, row: usize, col: usize) -> Result<Coord, RuleError> {
        if !self.board.contains(row, col) {
            return Err(RuleError::CellOutOfBounds { row, col });
        }
        Ok(Coord::new(row, col))
    }

    pub fn ensure_accepting_moves(&self) -> Result<(), RuleError> {
        if self.is_finished() {
            return Err(RuleError::GameFinished);
        }
        if let Some(pending) = self.pending {
            return Err(RuleError::EvaluationPending { pending });
        }
        Ok(())
    }

    pub fn ensure_computer_turn(&self) -> Result<(), RuleError> {
        if self.is_finished() {
            return Err(RuleError::GameFinished);
        }
        if !self.is_computer_turn() {
            return Err(RuleError::NotComputerTurn);
        }
        Ok(())
    }

    pub fn cell(&self, row: usize, col: usize) -> Result<Cell, RuleError> {
        let at = self.ensure_cell(row, col)?;
        Ok(self.board.cell(at))
    }

    /// 将当前行棋方的棋子投入 `col` 列。
    ///
    /// 返回落点所在行；整列已满时返回 `Ok(None)` 且不做任何修改。
    /// 轮次立即交换，随后必须把这次落子交给 [`GameState::evaluate`]。
    pub fn place(&mut self, col: usize) -> Result<Option<usize>, RuleError> {
        self.ensure_accepting_moves()?;
        self.ensure_column(col)?;

        let Some(row) = self.board.free_row(col) else {
            return Ok(None);
        };

        let at = Coord::new(row, col);
        self.board.set(at, self.current_player.into());
        self.current_player = self.current_player.opponent();
        self.pending = Some(at);
        Ok(Some(row))
    }

    /// 对 `(row, col)` 处的落子进行胜负判定。
    ///
    /// 坐标必须是上一次 `place` 返回的位置，且只能判定一次。
    /// 获胜时轮次交还给胜者，使 `current_player` 即为胜方。
    pub fn evaluate(&mut self, row: usize, col: usize) -> Result<Outcome, RuleError> {
        let actual = self.ensure_cell(row, col)?;
        if self.is_finished() {
            return Err(RuleError::GameFinished);
        }
        let expected = self.pending.ok_or(RuleError::NoPendingPlacement)?;
        if expected != actual {
            return Err(RuleError::PlacementMismatch { expected, actual });
        }
        self.pending = None;

        let outcome = RuleEngine::evaluate(&self.board, actual, self.connect);
        if let Outcome::Win { winner, .. } = &outcome {
            self.current_player = *winner;
        }
        if let Some(message) = outcome.message() {
            console_log!("{message}");
            self.phase = GamePhase::GameOver;
            self.outcome = Some(outcome.clone());
        }
        Ok(outcome)
    }

    pub(crate) fn board_mut(&mut self) -> &mut Board {
        &mut self.board
    }

    pub fn integrity_check(&self) -> Result<(), IntegrityError> {
        self.board.integrity_check()?;
        if self.connect < 2 {
            return Err(IntegrityError::ConnectTooShort {
                connect: self.connect,
            });
        }
        if let Some(pending) = self.pending {
            if !self.board.contains(pending.row, pending.col)
                || self.board.cell(pending).is_empty()
            {
                return Err(IntegrityError::PendingCellEmpty {
                    row: pending.row,
                    col: pending.col,
                });
            }
        }
        Ok(())
    }
}
