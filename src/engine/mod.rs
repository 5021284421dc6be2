pub mod compare;
pub mod engine;
pub mod errors;
pub mod rules;
pub mod state;
pub mod view;

pub use compare::*;
pub use engine::*;
pub use errors::*;
pub use rules::*;
pub use state::*;
pub use view::*;
