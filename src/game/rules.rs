use std::fmt;

use serde::{Deserialize, Serialize};

use super::{
    board::{Board, Cell, Coord, IntegrityError},
    state::Player,
};

/// 四条判定轴，每条都会向正反两个方向扫描。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Horizontal,
    Vertical,
    DiagonalDownRight,
    DiagonalDownLeft,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Horizontal,
        Direction::Vertical,
        Direction::DiagonalDownRight,
        Direction::DiagonalDownLeft,
    ];

    pub const fn delta(self) -> (isize, isize) {
        match self {
            Direction::Horizontal => (0, 1),
            Direction::Vertical => (1, 0),
            Direction::DiagonalDownRight => (1, 1),
            Direction::DiagonalDownLeft => (1, -1),
        }
    }

    /// 该轴的正反两个方向，正向在前。
    pub const fn senses(self) -> [(isize, isize); 2] {
        let (d_row, d_col) = self.delta();
        [(d_row, d_col), (-d_row, -d_col)]
    }

    pub const fn is_diagonal(self) -> bool {
        matches!(
            self,
            Direction::DiagonalDownRight | Direction::DiagonalDownLeft
        )
    }
}

/// 经过枢轴格的连续同色棋子。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Run {
    pub direction: Direction,
    pub length: usize,
    /// 两侧越过连子后的第一个格子，碰到边界则为 `None`。
    pub ends: [Option<Coord>; 2],
}

/// 经过枢轴格的己方棋子，允许跨过有限个空位。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GappedRun {
    pub direction: Direction,
    pub tokens: usize,
    pub gaps: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum Outcome {
    Continuing,
    Win { winner: Player, cells: Vec<Coord> },
    Draw,
}

impl Outcome {
    pub fn is_game_over(&self) -> bool {
        !matches!(self, Outcome::Continuing)
    }

    pub fn winner(&self) -> Option<Player> {
        match self {
            Outcome::Win { winner, .. } => Some(*winner),
            _ => None,
        }
    }

    /// 结束菜单上显示的文字。
    pub fn message(&self) -> Option<String> {
        match self {
            Outcome::Continuing => None,
            Outcome::Win { winner, .. } => Some(format!("{winner} wins")),
            Outcome::Draw => Some("It's a draw!".to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum RuleError {
    GameFinished,
    InvalidDimensions {
        rows: usize,
        cols: usize,
    },
    InvalidConnectLength {
        connect: usize,
    },
    ColumnOutOfRange {
        col: usize,
        cols: usize,
    },
    CellOutOfBounds {
        row: usize,
        col: usize,
    },
    EvaluationPending {
        pending: Coord,
    },
    NoPendingPlacement,
    PlacementMismatch {
        expected: Coord,
        actual: Coord,
    },
    NoLegalMove,
    NotComputerTurn,
    UnknownMode {
        mode: String,
    },
    IntegrityViolation {
        error: IntegrityError,
    },
}

impl fmt::Display for RuleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleError::GameFinished => write!(f, "the game is already over"),
            RuleError::InvalidDimensions { rows, cols } => {
                write!(f, "a {rows}x{cols} board is not playable")
            }
            RuleError::InvalidConnectLength { connect } => {
                write!(f, "connect length {connect} must be at least 2")
            }
            RuleError::ColumnOutOfRange { col, cols } => {
                write!(f, "column {col} outside board with {cols} columns")
            }
            RuleError::CellOutOfBounds { row, col } => {
                write!(f, "cell ({row}, {col}) outside the board")
            }
            RuleError::EvaluationPending { pending } => {
                write!(f, "placement at {pending} has not been evaluated yet")
            }
            RuleError::NoPendingPlacement => write!(f, "no placement is waiting for evaluation"),
            RuleError::PlacementMismatch { expected, actual } => {
                write!(f, "expected evaluation of {expected}, got {actual}")
            }
            RuleError::NoLegalMove => write!(f, "every column is full"),
            RuleError::NotComputerTurn => write!(f, "it is not the computer's turn"),
            RuleError::UnknownMode { mode } => write!(f, "unknown game mode `{mode}`"),
            RuleError::IntegrityViolation { error } => {
                write!(f, "board integrity violated: {error:?}")
            }
        }
    }
}

impl std::error::Error for RuleError {}

/// 纯函数式的规则判定，不持有任何状态。
pub struct RuleEngine;

impl RuleEngine {
    fn solid_side(board: &Board, at: Coord, sense: (isize, isize)) -> (usize, Option<Coord>) {
        let target = board.cell(at);
        let mut length = 0;
        for next in board.ray(at, sense) {
            if board.cell(next) != target {
                return (length, Some(next));
            }
            length += 1;
        }
        (length, None)
    }

    pub fn run(board: &Board, at: Coord, direction: Direction) -> Run {
        let [forward, backward] = direction.senses();
        let (ahead, end_ahead) = Self::solid_side(board, at, forward);
        let (behind, end_behind) = Self::solid_side(board, at, backward);
        Run {
            direction,
            length: 1 + ahead + behind,
            ends: [end_ahead, end_behind],
        }
    }

    pub fn run_length(board: &Board, at: Coord, direction: Direction) -> usize {
        Self::run(board, at, direction).length
    }

    /// 经过 `at` 的最长连子；长度相同时取 `directions` 中靠前的方向。
    pub fn longest_run(board: &Board, at: Coord, directions: &[Direction]) -> Option<Run> {
        directions
            .iter()
            .map(|&direction| Self::run(board, at, direction))
            .fold(None, |best: Option<Run>, run| match best {
                Some(best) if best.length >= run.length => Some(best),
                _ => Some(run),
            })
    }

    /// 经过 `at` 且为同色或空位的格子数（含 `at` 本身）。
    pub fn open_length(board: &Board, at: Coord, direction: Direction) -> usize {
        let target = board.cell(at);
        let reach = |sense| {
            board
                .ray(at, sense)
                .take_while(|&next| {
                    let cell = board.cell(next);
                    cell == target || cell.is_empty()
                })
                .count()
        };
        let [forward, backward] = direction.senses();
        1 + reach(forward) + reach(backward)
    }

    /// 沿两个方向统计与 `at` 同色的棋子，总共最多跨过 `max_gaps` 个空位；
    /// 某一侧末尾未被棋子接上的空位不计入预算。
    pub fn gapped_run(board: &Board, at: Coord, direction: Direction, max_gaps: usize) -> GappedRun {
        let target = board.cell(at);
        let mut tokens = 1;
        let mut gaps = 0;

        for sense in direction.senses() {
            let mut trailing = 0;
            for next in board.ray(at, sense) {
                let cell = board.cell(next);
                if cell == target {
                    tokens += 1;
                    trailing = 0;
                } else if cell.is_empty() && gaps < max_gaps {
                    gaps += 1;
                    trailing += 1;
                } else {
                    break;
                }
            }
            gaps -= trailing;
        }

        GappedRun {
            direction,
            tokens,
            gaps,
        }
    }

    /// 第一条达到 `connect` 连子的轴上经过 `at` 的全部格子。
    pub fn winning_cells(board: &Board, at: Coord, connect: usize) -> Option<Vec<Coord>> {
        let target = board.cell(at);
        if target.is_empty() {
            return None;
        }

        let direction = Direction::ALL
            .into_iter()
            .find(|&direction| Self::run_length(board, at, direction) >= connect)?;

        let mut cells: Vec<Coord> = Vec::with_capacity(connect);
        for sense in direction.senses() {
            cells.extend(
                board
                    .ray(at, sense)
                    .take_while(|&next| board.cell(next) == target),
            );
        }
        cells.push(at);
        Some(cells)
    }

    pub fn is_draw(board: &Board, at: Coord) -> bool {
        at.row == 0 && board.top_row_full()
    }

    /// 刚落在 `at` 的棋子带来的结果。
    pub fn evaluate(board: &Board, at: Coord, connect: usize) -> Outcome {
        let Some(winner) = board.cell(at).player() else {
            return Outcome::Continuing;
        };

        if let Some(cells) = Self::winning_cells(board, at, connect) {
            return Outcome::Win { winner, cells };
        }
        if Self::is_draw(board, at) {
            return Outcome::Draw;
        }
        Outcome::Continuing
    }

    /// 若在 `at` 放下 `cell` 能连成 `connect` 子则为真。
    pub fn completes_line(board: &mut Board, at: Coord, cell: Cell, connect: usize) -> bool {
        let speculative = board.speculate(at, cell);
        Direction::ALL
            .into_iter()
            .any(|direction| Self::run_length(&speculative, at, direction) >= connect)
    }
}
