use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::game::{Board, Cell, Coord, Direction, GameState, Player, RuleEngine, RuleError};
use crate::utils::console_log;

/// 先扫描对角线，等长时对角线优先。
const SCAN_ORDER: [Direction; 4] = [
    Direction::DiagonalDownRight,
    Direction::DiagonalDownLeft,
    Direction::Horizontal,
    Direction::Vertical,
];

/// 潜在连子最多可跨过的空位数。
const MAX_GAPS: usize = 2;

/// 列的优先级，以十分之一为单位的定点数。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Priority(i32);

impl Priority {
    pub const WIN: Priority = Priority(50);
    pub const BLOCK: Priority = Priority(45);
    pub const NEUTRAL: Priority = Priority(0);
    pub const AVOID: Priority = Priority(-10);

    const DIAGONAL_BONUS: i32 = 2;

    pub const fn from_tenths(tenths: i32) -> Self {
        Priority(tenths)
    }

    /// `tokens - gaps / 10`，对角线再加 `0.2`。
    pub fn potential(tokens: usize, gaps: usize, diagonal: bool) -> Self {
        let bonus = if diagonal { Self::DIAGONAL_BONUS } else { 0 };
        Priority(tokens as i32 * 10 - gaps as i32 + bonus)
    }

    pub fn as_f64(self) -> f64 {
        f64::from(self.0) / 10.0
    }
}

impl Serialize for Priority {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_f64())
    }
}

impl<'de> Deserialize<'de> for Priority {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = f64::deserialize(deserializer)?;
        Ok(Priority((value * 10.0).round() as i32))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ColumnScore {
    pub col: usize,
    pub row: usize,
    pub priority: Priority,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AiDecision {
    pub row: usize,
    pub col: usize,
    pub player: Player,
    pub priority: Priority,
    /// 并列最高优先级的列数。
    pub tied: usize,
    pub scores: Vec<ColumnScore>,
}

/// 对手落在 `at` 后直接连成，或形成差一子的连子且两端都是当前可落的空位。
fn opponent_threat(board: &mut Board, at: Coord, opponent: Cell, connect: usize) -> bool {
    let speculative = board.speculate(at, opponent);
    let Some(run) = RuleEngine::longest_run(&speculative, at, &SCAN_ORDER) else {
        return false;
    };
    if run.length >= connect {
        return true;
    }

    run.length + 1 == connect
        && run.ends.iter().all(|end| match end {
            Some(end) => {
                speculative.cell(*end).is_empty() && speculative.free_row(end.col) == Some(end.row)
            }
            None => false,
        })
}

fn run_potential(board: &mut Board, at: Coord, me: Cell, connect: usize) -> Priority {
    let own = board.speculate(at, me);

    let reachable = SCAN_ORDER
        .iter()
        .map(|&direction| RuleEngine::open_length(&own, at, direction))
        .max()
        .unwrap_or(0);
    if reachable < connect {
        return Priority::NEUTRAL;
    }

    let best = SCAN_ORDER
        .iter()
        .map(|&direction| RuleEngine::gapped_run(&own, at, direction, MAX_GAPS))
        .reduce(|best, run| if run.tokens > best.tokens { run } else { best });

    match best {
        Some(run) => Priority::potential(run.tokens, run.gaps, run.direction.is_diagonal()),
        None => Priority::NEUTRAL,
    }
}

fn score_column(board: &mut Board, at: Coord, me: Player, connect: usize) -> Priority {
    let opponent = me.opponent();
    let floor = opponent_threat(board, at, opponent.into(), connect).then_some(Priority::BLOCK);
    let settle = |priority: Priority| floor.map_or(priority, |floor| floor.max(priority));

    if RuleEngine::completes_line(board, at, me.into(), connect) {
        return settle(Priority::WIN);
    }

    // 只看一层：在此落子是否会把上方的格子让给对手取胜？
    if let Some(above) = at.row.checked_sub(1) {
        let mut own = board.speculate(at, me.into());
        if RuleEngine::completes_line(&mut own, Coord::new(above, at.col), opponent.into(), connect)
        {
            return settle(Priority::AVOID);
        }
    }

    settle(run_potential(board, at, me.into(), connect))
}

/// `me` 在每个可落列上的优先级；返回时 `board` 保持原样。
pub fn score_columns(board: &mut Board, me: Player, connect: usize) -> Vec<ColumnScore> {
    let free: Vec<(usize, usize)> = board.free_columns().collect();
    free.into_iter()
        .map(|(col, row)| ColumnScore {
            col,
            row,
            priority: score_column(board, Coord::new(row, col), me, connect),
        })
        .collect()
}

/// 电脑玩家：按启发式评分选列，同分时均匀随机。
pub struct AiAgent {
    rng: SmallRng,
}

impl AiAgent {
    pub fn new() -> Self {
        Self {
            rng: SmallRng::from_entropy(),
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    /// 为当前行棋方选列，但不落子。
    pub fn choose(&mut self, state: &mut GameState) -> Result<AiDecision, RuleError> {
        state.ensure_accepting_moves()?;

        let player = state.current_player();
        let connect = state.connect;
        let scores = score_columns(state.board_mut(), player, connect);

        let priority = scores
            .iter()
            .map(|score| score.priority)
            .max()
            .ok_or(RuleError::NoLegalMove)?;
        let tied: Vec<ColumnScore> = scores
            .iter()
            .filter(|score| score.priority == priority)
            .copied()
            .collect();
        let pick = tied.choose(&mut self.rng).ok_or(RuleError::NoLegalMove)?;

        Ok(AiDecision {
            row: pick.row,
            col: pick.col,
            player,
            priority,
            tied: tied.len(),
            scores,
        })
    }

    /// 选列并为当前行棋方落子。
    pub fn decide_action(&mut self, state: &mut GameState) -> Result<AiDecision, RuleError> {
        let decision = self.choose(state)?;
        let row = state
            .place(decision.col)?
            .ok_or(RuleError::NoLegalMove)?;
        debug_assert_eq!(row, decision.row);

        console_log!(
            "{} plays column {} (priority {:.1}, {} tied) from {:?}",
            decision.player,
            decision.col,
            decision.priority.as_f64(),
            decision.tied,
            decision
                .scores
                .iter()
                .map(|score| (score.col, score.priority.as_f64()))
                .collect::<Vec<_>>()
        );
        Ok(decision)
    }

    /// 在 `state` 的副本上执行 [`AiAgent::choose`]。
    pub fn suggest(&mut self, state: &GameState) -> Result<AiDecision, RuleError> {
        let mut scratch = state.clone();
        self.choose(&mut scratch)
    }
}

impl Default for AiAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::GamePhase;

    fn position(rows: &[&str], to_move: Player) -> GameState {
        let board = Board::from_rows(rows).expect("fixture should parse");
        GameState::from_board(board, to_move)
    }

    fn priority_of(scores: &[ColumnScore], col: usize) -> Priority {
        scores
            .iter()
            .find(|score| score.col == col)
            .map(|score| score.priority)
            .expect("column should be playable")
    }

    #[test]
    fn blocks_open_three_instead_of_playing_neutral() {
        let mut state = position(
            &[
                ".......",
                ".......",
                ".......",
                "..BB...",
                "..RRR..",
            ],
            Player::Blue,
        );
        let mut agent = AiAgent::with_seed(3);

        let decision = agent.decide_action(&mut state).expect("a move exists");

        assert_eq!(decision.priority, Priority::BLOCK);
        assert!([1, 5].contains(&decision.col), "chose {}", decision.col);
        assert_eq!(decision.tied, 2);
        assert_eq!(state.pending, Some(Coord::new(4, decision.col)));
        assert_eq!(state.current_player(), Player::Red);
    }

    #[test]
    fn takes_the_immediate_win() {
        let mut state = position(
            &[
                ".......",
                ".......",
                ".......",
                "BB.....",
                "RRR...B",
            ],
            Player::Red,
        );
        let scores = score_columns(&mut state.board, Player::Red, 4);
        assert_eq!(priority_of(&scores, 3), Priority::WIN);

        let decision = AiAgent::with_seed(11)
            .decide_action(&mut state)
            .expect("a move exists");
        assert_eq!((decision.row, decision.col), (4, 3));
        assert_eq!(decision.priority, Priority::WIN);

        let outcome = state.evaluate(4, 3).expect("pending placement");
        assert_eq!(outcome.winner(), Some(Player::Red));
        assert_eq!(state.phase, GamePhase::GameOver);
    }

    #[test]
    fn open_two_becomes_a_block_target() {
        let mut board = Board::from_rows(&[
            ".......",
            ".......",
            ".......",
            "......B",
            "..RR..B",
        ])
        .expect("fixture should parse");

        let scores = score_columns(&mut board, Player::Blue, 4);

        assert_eq!(priority_of(&scores, 1), Priority::BLOCK);
        assert_eq!(priority_of(&scores, 4), Priority::BLOCK);
        assert!(priority_of(&scores, 0) < Priority::BLOCK);
    }

    #[test]
    fn avoids_stacking_under_an_opponent_win() {
        let mut state = position(
            &[
                ".......",
                ".......",
                ".......",
                "RRR....",
                "BBR.B..",
            ],
            Player::Blue,
        );
        let scores = score_columns(&mut state.board, Player::Blue, 4);
        assert_eq!(priority_of(&scores, 3), Priority::AVOID);

        for seed in 0..16 {
            let decision = AiAgent::with_seed(seed)
                .suggest(&state)
                .expect("a move exists");
            assert_ne!(decision.col, 3);
            assert!(decision.priority >= Priority::NEUTRAL);
        }
    }

    #[test]
    fn block_outranks_self_endangerment_on_the_same_cell() {
        let mut state = position(
            &[
                ".......",
                ".......",
                ".......",
                "RRR....",
                "RRR..BB",
            ],
            Player::Blue,
        );
        let scores = score_columns(&mut state.board, Player::Blue, 4);
        assert_eq!(priority_of(&scores, 3), Priority::BLOCK);

        let decision = AiAgent::with_seed(2)
            .decide_action(&mut state)
            .expect("a move exists");
        assert_eq!((decision.row, decision.col), (4, 3));
        assert_eq!(decision.tied, 1);
    }

    #[test]
    fn win_outranks_a_block_on_the_same_cell() {
        let mut board = Board::from_rows(&[
            ".......",
            ".......",
            ".......",
            ".......",
            "BBB.RRR",
        ])
        .expect("fixture should parse");

        let scores = score_columns(&mut board, Player::Blue, 4);

        assert_eq!(priority_of(&scores, 3), Priority::WIN);
    }

    #[test]
    fn three_against_the_edge_is_not_a_block_target() {
        let mut board = Board::from_rows(&[
            ".......",
            ".......",
            ".......",
            ".......",
            ".RR....",
        ])
        .expect("fixture should parse");

        let scores = score_columns(&mut board, Player::Blue, 4);

        assert!(priority_of(&scores, 0) < Priority::BLOCK);
        assert_eq!(priority_of(&scores, 3), Priority::BLOCK);
    }

    #[test]
    fn potential_needs_connect_cells_counting_the_landing_cell() {
        let mut exact =
            Board::from_rows(&["...", "...", "...", "R.R"]).expect("fixture should parse");
        let scores = score_columns(&mut exact, Player::Blue, 4);
        assert_eq!(priority_of(&scores, 1), Priority::potential(1, 0, true));

        let mut short =
            Board::from_rows(&["...", "...", "R.R"]).expect("fixture should parse");
        let scores = score_columns(&mut short, Player::Blue, 4);
        assert_eq!(priority_of(&scores, 1), Priority::NEUTRAL);
    }

    #[test]
    fn scoring_restores_the_board() {
        let mut board = Board::from_rows(&[
            ".......",
            "...R...",
            "..BB...",
            ".RRBB..",
            "BRBRRB.",
        ])
        .expect("fixture should parse");
        let before = board.clone();

        let scores = score_columns(&mut board, Player::Red, 4);

        assert_eq!(board, before);
        assert_eq!(scores.len(), 7);
    }

    #[test]
    fn empty_board_ties_every_column_and_all_are_reachable() {
        let mut board = Board::new(5, 7).expect("valid dimensions");
        let scores = score_columns(&mut board, Player::Red, 4);
        assert!(scores
            .iter()
            .all(|score| score.priority == Priority::potential(1, 0, true)));

        let state = GameState::from_board(board, Player::Red);
        let mut seen = [false; 7];
        let mut agent = AiAgent::with_seed(42);
        for _ in 0..400 {
            let decision = agent.suggest(&state).expect("a move exists");
            assert_eq!(decision.tied, 7);
            seen[decision.col] = true;
        }
        assert!(seen.iter().all(|&hit| hit), "unreached columns: {seen:?}");
    }

    #[test]
    fn never_picks_a_full_column() {
        let mut state = position(&["R.B", "BRR", "RBB"], Player::Blue);
        let decision = AiAgent::with_seed(5)
            .decide_action(&mut state)
            .expect("column 1 is free");
        assert_eq!((decision.row, decision.col), (0, 1));
        assert_eq!(decision.scores.len(), 1);
    }

    #[test]
    fn full_board_has_no_legal_move() {
        let mut state = position(&["RB", "BR"], Player::Red);
        assert_eq!(
            AiAgent::with_seed(0).decide_action(&mut state),
            Err(RuleError::NoLegalMove)
        );
    }

    #[test]
    fn refuses_to_move_over_an_unevaluated_placement() {
        let mut state = position(&["....", "...."], Player::Red);
        state.place(0).expect("placement should be accepted");
        assert_eq!(
            AiAgent::with_seed(0).decide_action(&mut state),
            Err(RuleError::EvaluationPending {
                pending: Coord::new(1, 0)
            })
        );
    }

    #[test]
    fn potential_prefers_tight_diagonal_runs() {
        assert_eq!(Priority::potential(3, 0, false).as_f64(), 3.0);
        assert_eq!(Priority::potential(3, 1, true), Priority::from_tenths(31));
        assert!(Priority::potential(2, 0, true) > Priority::potential(2, 1, false));
        assert!(Priority::WIN > Priority::BLOCK);
        assert!(Priority::AVOID < Priority::NEUTRAL);
    }

    #[test]
    fn priority_serialises_as_a_float() {
        let json = serde_json::to_string(&Priority::BLOCK).expect("serialisable");
        assert_eq!(json, "4.5");
        let back: Priority = serde_json::from_str("-1.0").expect("deserialisable");
        assert_eq!(back, Priority::AVOID);
    }
}
