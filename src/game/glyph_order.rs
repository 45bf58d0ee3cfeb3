//! Glyph Order Module
//!
//! Reference puzzle. Generation picks one column of the manual and shows
//! six of its glyphs in shuffled order. Players must press the glyphs in
//! the column's original order, which only the manual reader knows.

use serde::{Serialize, Deserialize};

use crate::core::rng::DeterministicRng;
use crate::game::module::{Applied, Generated, ModuleError, TypedModule};

/// Manual revision the columns below belong to.
pub const MANUAL_ID: &str = "v1";

/// Number of glyphs shown, and presses required to solve.
pub const SHOWN_COUNT: usize = 6;

/// The manual: ordered glyph columns.
pub static MANUAL: [[&str; 8]; 4] = [
    ["alpha", "beta", "gamma", "delta", "epsilon", "zeta", "eta", "theta"],
    ["sun", "moon", "star", "comet", "nova", "quark", "boson", "neutrino"],
    ["red", "orange", "yellow", "green", "blue", "indigo", "violet", "pink"],
    ["one", "two", "three", "four", "five", "six", "seven", "eight"],
];

/// Generated parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlyphOrderParams {
    /// Manual revision.
    pub manual_id: String,
    /// Selected manual column.
    pub column_index: usize,
    /// Shuffled glyphs displayed to players.
    pub shown: Vec<String>,
}

/// Module state.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GlyphOrderState {
    /// Glyphs accepted so far, in order.
    pub pressed: Vec<String>,
    /// Module-local wrong presses.
    pub strikes: u32,
}

/// A single glyph press.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlyphOrderAction {
    /// Pressed glyph.
    pub press: String,
}

/// The glyph order module.
#[derive(Debug, Clone, Copy, Default)]
pub struct GlyphOrder;

impl GlyphOrder {
    /// Registry key.
    pub const KEY: &'static str = "glyphOrder";

    fn column(params: &GlyphOrderParams) -> Result<&'static [&'static str; 8], ModuleError> {
        MANUAL.get(params.column_index).ok_or_else(|| {
            ModuleError::CorruptState(format!("column index {} out of range", params.column_index))
        })
    }
}

impl TypedModule for GlyphOrder {
    type Params = GlyphOrderParams;
    type State = GlyphOrderState;
    type Action = GlyphOrderAction;

    const KEY: &'static str = GlyphOrder::KEY;

    fn generate(&self, seed: &str) -> Generated<GlyphOrderParams, GlyphOrderState> {
        let mut rng = DeterministicRng::from_seed_str(seed);
        let column_index = rng.next_int(MANUAL.len() as u32) as usize;

        let mut shown: Vec<String> = MANUAL[column_index][..SHOWN_COUNT]
            .iter()
            .map(|glyph| glyph.to_string())
            .collect();
        rng.shuffle(&mut shown);

        Generated {
            params: GlyphOrderParams {
                manual_id: MANUAL_ID.to_string(),
                column_index,
                shown,
            },
            init: GlyphOrderState::default(),
        }
    }

    fn apply(
        &self,
        state: &GlyphOrderState,
        action: &GlyphOrderAction,
        params: &GlyphOrderParams,
    ) -> Result<Applied<GlyphOrderState>, ModuleError> {
        if state.pressed.len() >= SHOWN_COUNT {
            return Err(ModuleError::AlreadySolved);
        }

        let column = Self::column(params)?;
        let next = column[state.pressed.len()];

        if action.press == next {
            let mut pressed = state.pressed.clone();
            pressed.push(action.press.clone());
            let solved = pressed.len() == SHOWN_COUNT;
            let new_state = GlyphOrderState { pressed, strikes: state.strikes };

            Ok(if solved { Applied::solved(new_state) } else { Applied::progress(new_state) })
        } else {
            Ok(Applied::strike(GlyphOrderState {
                pressed: state.pressed.clone(),
                strikes: state.strikes + 1,
            }))
        }
    }
}
