pub mod ai;
pub mod game;
pub mod utils;

use gloo_timers::future::TimeoutFuture;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde_wasm_bindgen::{from_value, to_value};
use std::str::FromStr;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::future_to_promise;
use web_sys::js_sys::Promise;

pub use ai::{score_columns, AiAgent, AiDecision, ColumnScore, Priority};
pub use game::{
    Board, Cell, Coord, Direction, GameConfig, GameMode, GamePhase, GameState, IntegrityError,
    Outcome, Player, RuleEngine, RuleError,
};

use utils::console_warn;

#[cfg(feature = "wee_alloc")]
#[global_allocator]
static ALLOC: wee_alloc::WeeAlloc = wee_alloc::WeeAlloc::INIT;

#[wasm_bindgen(start)]
pub fn start() {
    utils::set_panic_hook();
}

fn to_js_error(error: RuleError) -> JsValue {
    to_value(&error).unwrap_or_else(|serialize_err| JsValue::from_str(&serialize_err.to_string()))
}

fn serde_to_js_error<E: std::fmt::Display>(error: E) -> JsValue {
    JsValue::from_str(&error.to_string())
}

fn integrity_to_js_error(error: IntegrityError) -> JsValue {
    to_js_error(RuleError::IntegrityViolation { error })
}

/// 供前端持有的对局引擎：渲染层只通过这些方法读写棋局。
#[wasm_bindgen]
pub struct GameEngine {
    state: GameState,
    agent: AiAgent,
    rng: SmallRng,
}

#[wasm_bindgen]
impl GameEngine {
    #[wasm_bindgen(constructor)]
    pub fn new(config_json: Option<String>) -> Result<GameEngine, JsValue> {
        let config = if let Some(json) = config_json {
            serde_json::from_str::<GameConfig>(&json).map_err(serde_to_js_error)?
        } else {
            GameConfig::default()
        };

        let mut rng = match config.seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        };
        let agent = AiAgent::with_seed(rng.gen());
        let state = GameState::new(&config, &mut rng).map_err(to_js_error)?;

        Ok(GameEngine { state, agent, rng })
    }

    /// 清空棋盘（必要时调整尺寸），并重新抽取先手。
    pub fn reset(&mut self, rows: u32, cols: u32) -> Result<(), JsValue> {
        self.state
            .reset(rows as usize, cols as usize, &mut self.rng)
            .map_err(to_js_error)
    }

    pub fn set_mode(&mut self, mode: &str) -> Result<(), JsValue> {
        self.state.mode = GameMode::from_str(mode).map_err(to_js_error)?;
        Ok(())
    }

    /// 返回落点所在行；整列已满时为 `undefined`。
    pub fn place(&mut self, col: u32) -> Result<Option<u32>, JsValue> {
        let row = self.state.place(col as usize).map_err(to_js_error)?;
        Ok(row.map(|row| row as u32))
    }

    pub fn compute_move(&mut self) -> Result<JsValue, JsValue> {
        self.state.ensure_computer_turn().map_err(to_js_error)?;
        let decision = self
            .agent
            .decide_action(&mut self.state)
            .map_err(to_js_error)?;
        to_value(&decision).map_err(JsValue::from)
    }

    pub fn evaluate(&mut self, row: u32, col: u32) -> Result<JsValue, JsValue> {
        let outcome = self
            .state
            .evaluate(row as usize, col as usize)
            .map_err(to_js_error)?;
        to_value(&outcome).map_err(JsValue::from)
    }

    pub fn cell(&self, row: u32, col: u32) -> Result<u8, JsValue> {
        let cell = self
            .state
            .cell(row as usize, col as usize)
            .map_err(to_js_error)?;
        Ok(cell.code())
    }

    pub fn current_player(&self) -> u8 {
        self.state.current_player().code()
    }

    pub fn last_mover(&self) -> u8 {
        self.state.last_mover().code()
    }

    pub fn is_computer_turn(&self) -> bool {
        self.state.is_computer_turn()
    }

    pub fn is_finished(&self) -> bool {
        self.state.is_finished()
    }

    pub fn rows(&self) -> u32 {
        self.state.board.rows() as u32
    }

    pub fn cols(&self) -> u32 {
        self.state.board.cols() as u32
    }

    pub fn state_json(&self) -> Result<String, JsValue> {
        serde_json::to_string(&self.state).map_err(serde_to_js_error)
    }

    pub fn set_state_json(&mut self, json: &str) -> Result<(), JsValue> {
        let state: GameState = serde_json::from_str(json).map_err(serde_to_js_error)?;
        if let Err(error) = state.integrity_check() {
            console_warn!("rejected imported state: {error:?}");
            return Err(integrity_to_js_error(error));
        }
        self.state = state;
        Ok(())
    }

    /// 异步给出电脑会选择的列，但不落子。
    pub fn think_ai(&mut self, delay_ms: Option<u32>) -> Promise {
        let state = self.state.clone();
        let seed: u64 = self.rng.gen();
        let delay = delay_ms.unwrap_or(0);

        future_to_promise(async move {
            if delay > 0 {
                TimeoutFuture::new(delay).await;
            }
            let decision = AiAgent::with_seed(seed)
                .suggest(&state)
                .map_err(to_js_error)?;
            let json = serde_json::to_string(&decision).map_err(serde_to_js_error)?;
            Ok(JsValue::from_str(&json))
        })
    }
}

#[wasm_bindgen(js_name = "validateState")]
pub fn validate_state(state: JsValue) -> Result<(), JsValue> {
    let state: GameState = from_value(state).map_err(JsValue::from)?;
    state.integrity_check().map_err(integrity_to_js_error)
}

/// 对任意棋盘快照判定某一落子的结果，不修改任何状态。
#[wasm_bindgen(js_name = "evaluateBoard")]
pub fn evaluate_board(
    board: JsValue,
    row: u32,
    col: u32,
    connect: Option<u32>,
) -> Result<JsValue, JsValue> {
    let board: Board = from_value(board).map_err(JsValue::from)?;
    board.integrity_check().map_err(integrity_to_js_error)?;

    let (row, col) = (row as usize, col as usize);
    if !board.contains(row, col) {
        return Err(to_js_error(RuleError::CellOutOfBounds { row, col }));
    }
    let connect = connect.map_or(game::DEFAULT_CONNECT, |value| value as usize);
    if connect < 2 {
        return Err(to_js_error(RuleError::InvalidConnectLength { connect }));
    }
    let outcome = RuleEngine::evaluate(&board, Coord::new(row, col), connect);
    to_value(&outcome).map_err(JsValue::from)
}

#[wasm_bindgen(js_name = "computeAiMove")]
pub fn compute_ai_move(state: JsValue, seed: Option<u32>) -> Result<JsValue, JsValue> {
    let state: GameState = from_value(state).map_err(JsValue::from)?;
    state.integrity_check().map_err(integrity_to_js_error)?;

    let mut agent = match seed {
        Some(seed) => AiAgent::with_seed(u64::from(seed)),
        None => AiAgent::new(),
    };
    let decision = agent.suggest(&state).map_err(to_js_error)?;
    to_value(&decision).map_err(JsValue::from)
}
