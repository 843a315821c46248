//! `tdm-choice` — discrete choice machinery for the `tdm` pipeline.
//!
//! # Crate layout
//!
//! | Module          | Contents                                                      |
//! |-----------------|---------------------------------------------------------------|
//! | [`expr`]        | utility term expressions: parser, compiler, evaluator         |
//! | [`spec`]        | `UtilitySpec` and `Coefficients` CSV loaders, `Term`          |
//! | [`utility`]     | `UtilityEvaluator` (terms bound to tables), `SkimContext`     |
//! | [`logit`]       | `utils_to_probs`, `logsum`, `make_choice`                     |
//! | [`interaction`] | `InteractionSample`, `InteractionSimulate`                    |
//! | [`mode`]        | `ModeChoiceModel` (multinomial mode choice and logsums)       |
//! | [`error`]       | `ChoiceError`, `ChoiceResult<T>`                              |
//!
//! # Feature flags
//!
//! | Flag       | Effect                                                       |
//! |------------|--------------------------------------------------------------|
//! | `parallel` | Per-chooser utilities of a chunk are evaluated on Rayon.     |

pub mod error;
pub mod expr;
pub mod interaction;
pub mod logit;
pub mod mode;
pub mod spec;
pub mod utility;


pub use error::{ChoiceError, ChoiceResult};
pub use expr::{Ast, Expr};
pub use interaction::{
    CHOICE_COLUMN, InteractionSample, InteractionSimulate, LOGSUM_COLUMN, PICK_COUNT_COLUMN, PROB_COLUMN,
};
pub use mode::{MODE_COLUMN, ModeChoiceModel};
pub use spec::{
    Coefficients, Constants, Term, UtilitySpec, load_coefficients_csv, load_coefficients_reader, load_spec_csv,
    load_spec_reader,
};
pub use utility::{SkimContext, UtilityEvaluator, ZoneSource};
