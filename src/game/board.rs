use std::fmt;
use std::iter;
use std::ops::{Deref, DerefMut};

use serde::{Deserialize, Serialize};

use super::rules::RuleError;
use super::state::Player;

/// 单元格状态。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Cell {
    Empty,
    Red,
    Blue,
}

impl Default for Cell {
    fn default() -> Self {
        Cell::Empty
    }
}

impl Cell {
    pub fn is_empty(self) -> bool {
        matches!(self, Cell::Empty)
    }

    /// 交给渲染层的数字编码：0 空，1 红，2 蓝。
    pub fn code(self) -> u8 {
        match self {
            Cell::Empty => 0,
            Cell::Red => 1,
            Cell::Blue => 2,
        }
    }

    pub fn player(self) -> Option<Player> {
        match self {
            Cell::Empty => None,
            Cell::Red => Some(Player::Red),
            Cell::Blue => Some(Player::Blue),
        }
    }

    fn symbol(self) -> char {
        match self {
            Cell::Empty => '.',
            Cell::Red => 'R',
            Cell::Blue => 'B',
        }
    }

    fn from_symbol(symbol: char) -> Option<Self> {
        match symbol {
            '.' | '_' => Some(Cell::Empty),
            'R' | 'r' => Some(Cell::Red),
            'B' | 'b' => Some(Cell::Blue),
            _ => None,
        }
    }
}

impl From<Player> for Cell {
    fn from(player: Player) -> Self {
        match player {
            Player::Red => Cell::Red,
            Player::Blue => Cell::Blue,
        }
    }
}

/// 棋盘坐标，第 0 行位于顶部。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Coord {
    pub row: usize,
    pub col: usize,
}

impl Coord {
    pub const fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

impl fmt::Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum IntegrityError {
    CellCountMismatch { expected: usize, actual: usize },
    RaggedRow { row: usize, expected: usize, actual: usize },
    UnknownSymbol { row: usize, col: usize, symbol: char },
    FloatingToken { row: usize, col: usize },
    PendingCellEmpty { row: usize, col: usize },
    ConnectTooShort { connect: usize },
    InvalidDimensions { rows: usize, cols: usize },
}

fn cell_count(rows: usize, cols: usize) -> Option<usize> {
    rows.checked_mul(cols).filter(|&count| count > 0)
}

/// 带重力的网格：棋子总是落到所在列最低的空位。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Board {
    rows: usize,
    cols: usize,
    cells: Vec<Cell>,
}

impl Board {
    /// 创建空棋盘；任一边为零或格子总数溢出时报错。
    pub fn new(rows: usize, cols: usize) -> Result<Self, RuleError> {
        let count = cell_count(rows, cols).ok_or(RuleError::InvalidDimensions { rows, cols })?;
        Ok(Self {
            rows,
            cols,
            cells: vec![Cell::Empty; count],
        })
    }

    /// 由自上而下的行字符串（`.`、`R`、`B`）构造棋盘。
    pub fn from_rows(rows: &[&str]) -> Result<Self, RuleError> {
        let cols = rows.first().map(|line| line.chars().count()).unwrap_or(0);
        let mut board = Board::new(rows.len(), cols)?;

        for (row, line) in rows.iter().enumerate() {
            let actual = line.chars().count();
            if actual != cols {
                return Err(RuleError::IntegrityViolation {
                    error: IntegrityError::RaggedRow {
                        row,
                        expected: cols,
                        actual,
                    },
                });
            }
            for (col, symbol) in line.chars().enumerate() {
                let cell = Cell::from_symbol(symbol).ok_or(RuleError::IntegrityViolation {
                    error: IntegrityError::UnknownSymbol { row, col, symbol },
                })?;
                board.set(Coord::new(row, col), cell);
            }
        }

        board
            .integrity_check()
            .map_err(|error| RuleError::IntegrityViolation { error })?;
        Ok(board)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn contains(&self, row: usize, col: usize) -> bool {
        row < self.rows && col < self.cols
    }

    pub fn column_in_range(&self, col: usize) -> bool {
        col < self.cols
    }

    fn index(&self, at: Coord) -> usize {
        assert!(
            self.contains(at.row, at.col),
            "cell {at} outside {}x{} board",
            self.rows,
            self.cols
        );
        at.row * self.cols + at.col
    }

    pub fn cell(&self, at: Coord) -> Cell {
        self.cells[self.index(at)]
    }

    pub(crate) fn set(&mut self, at: Coord, cell: Cell) {
        let index = self.index(at);
        self.cells[index] = cell;
    }

    /// `col` 列最低的空行；整列已满时返回 `None`。
    pub fn free_row(&self, col: usize) -> Option<usize> {
        assert!(
            self.column_in_range(col),
            "column {col} outside board with {} columns",
            self.cols
        );
        (0..self.rows)
            .rev()
            .find(|&row| self.cell(Coord::new(row, col)).is_empty())
    }

    /// 所有仍可落子的列，形如 `(col, free_row)`。
    pub fn free_columns(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        (0..self.cols).filter_map(move |col| self.free_row(col).map(|row| (col, row)))
    }

    pub fn reset(&mut self) {
        self.cells.fill(Cell::Empty);
    }

    pub fn is_full(&self) -> bool {
        self.cells.iter().all(|cell| !cell.is_empty())
    }

    pub fn top_row_full(&self) -> bool {
        (0..self.cols).all(|col| !self.cell(Coord::new(0, col)).is_empty())
    }

    pub fn step(&self, from: Coord, (d_row, d_col): (isize, isize)) -> Option<Coord> {
        let row = from.row.checked_add_signed(d_row)?;
        let col = from.col.checked_add_signed(d_col)?;
        self.contains(row, col).then(|| Coord::new(row, col))
    }

    /// 从 `from`（不含）沿 `delta` 走到边界途经的格子。
    pub fn ray(&self, from: Coord, delta: (isize, isize)) -> impl Iterator<Item = Coord> + '_ {
        iter::successors(self.step(from, delta), move |&at| self.step(at, delta))
    }

    /// 在 `at` 处暂时写入 `cell`，守卫被丢弃时恢复。
    pub fn speculate(&mut self, at: Coord, cell: Cell) -> Speculation<'_> {
        let previous = self.cell(at);
        self.set(at, cell);
        Speculation {
            board: self,
            at,
            previous,
        }
    }

    pub fn integrity_check(&self) -> Result<(), IntegrityError> {
        let expected =
            cell_count(self.rows, self.cols).ok_or(IntegrityError::InvalidDimensions {
                rows: self.rows,
                cols: self.cols,
            })?;
        if self.cells.len() != expected {
            return Err(IntegrityError::CellCountMismatch {
                expected,
                actual: self.cells.len(),
            });
        }

        for col in 0..self.cols {
            let mut seen_token = false;
            for row in 0..self.rows {
                let occupied = !self.cell(Coord::new(row, col)).is_empty();
                if seen_token && !occupied {
                    // 空位正上方的棋子悬空
                    return Err(IntegrityError::FloatingToken { row: row - 1, col });
                }
                seen_token |= occupied;
            }
        }

        Ok(())
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in 0..self.rows {
            let line: String = (0..self.cols)
                .map(|col| self.cell(Coord::new(row, col)).symbol())
                .collect();
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}

/// 假设落子的守卫：离开作用域时恢复原来的单元格。
pub struct Speculation<'a> {
    board: &'a mut Board,
    at: Coord,
    previous: Cell,
}

impl Deref for Speculation<'_> {
    type Target = Board;

    fn deref(&self) -> &Board {
        self.board
    }
}

impl DerefMut for Speculation<'_> {
    fn deref_mut(&mut self) -> &mut Board {
        self.board
    }
}

impl Drop for Speculation<'_> {
    fn drop(&mut self) {
        self.board.set(self.at, self.previous);
    }
}
