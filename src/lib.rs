//! # Microprolog
//!
//! The unification and backtracking core of a Prolog-style resolution
//! engine.
//!
//! ## Features
//!
//! - Immutable term templates shared across activations
//! - Variable binding with aliasing chains, undoable through a trail
//! - Structural unification with partial rollback
//! - Continuation-driven solution enumeration for primitives
//!
//! ## Example
//!
//! ```rust
//! use microprolog::{unify, Bindings, Term, Trail};
//!
//! let x = Term::var("X", 0);
//! let context = Bindings::for_term(&x);
//! let facts = Bindings::new(0);
//! let mut trail = Trail::new();
//!
//! let checkpoint = trail.mark();
//! assert!(unify(&x, &context, &Term::int(42), &facts, &mut trail));
//! assert_eq!(context.focus(&x).as_int(), Some(42));
//!
//! // Backtracking: undo the attempt, X is free again.
//! trail.undo_to(checkpoint);
//! assert!(context.is_free(0));
//! ```

/// Binding cells, variable contexts and focusing.
pub mod bindings;
/// Domain error conditions.
pub mod error;
/// Continuation-driven solution enumeration.
pub mod solve;
/// Logic terms and structural traversal.
pub mod term;
/// Backtracking ledger.
pub mod trail;
/// Structural unification.
pub mod unify;

pub use bindings::{first_free_var, resolve, Binding, BindingState, Bindings, CellRef, Focused};
pub use error::EngineError;
pub use solve::{int_range, unify_and_notify, Primitive, SolutionListener};
pub use term::{Kind, Opaque, Struct, Term, TermVisitor, Var};
pub use trail::{Checkpoint, Trail};
pub use unify::{undo_bindings, unify};
