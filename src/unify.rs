use crate::bindings::{Bindings, Focused};
use crate::term::Term;
use crate::trail::{Checkpoint, Trail};
use std::rc::Rc;

/// Structurally unify `term1` (under `context1`) with `term2` (under
/// `context2`), recording every binding performed on `trail`.
///
/// Returns whether unification succeeded. Failure is the normal outcome
/// of most attempts during a search, never an error. A failed call leaves
/// no residue: bindings made for earlier subterms are undone before the
/// call returns, so the trail and every touched cell are back in their
/// pre-call state.
///
/// When both sides resolve to distinct free variables, the first
/// argument's cell is the one that becomes aliased to the second's.
pub fn unify(
    term1: &Rc<Term>,
    context1: &Rc<Bindings>,
    term2: &Rc<Term>,
    context2: &Rc<Bindings>,
    trail: &mut Trail,
) -> bool {
    let checkpoint = trail.mark();
    let unified = unify_resolved(term1, context1, term2, context2, trail);
    if !unified {
        trail.undo_to(checkpoint);
    }
    log::trace!("unify {term1} ~ {term2}: {unified}");
    unified
}

/// Undo every binding recorded since `checkpoint`.
///
/// Thin alias over [`Trail::undo_to`], named for the unify/undo pairing
/// callers deal in.
pub fn undo_bindings(trail: &mut Trail, checkpoint: Checkpoint) {
    trail.undo_to(checkpoint);
}

fn unify_resolved(
    term1: &Rc<Term>,
    context1: &Rc<Bindings>,
    term2: &Rc<Term>,
    context2: &Rc<Bindings>,
    trail: &mut Trail,
) -> bool {
    let focused1 = context1.focus(term1);
    let focused2 = context2.focus(term2);
    match (focused1, focused2) {
        (Focused::FreeVar { cell: cell1, .. }, Focused::FreeVar { cell: cell2, .. }) => {
            if cell1.same_cell(&cell2) {
                // Both sides are the same variable already.
                return true;
            }
            // Canonical direction: the left cell aliases the right one.
            // bind() dereferences term2 down to cell2 and links to it.
            cell1.bind(term2, context2, Some(trail));
            true
        }
        (Focused::FreeVar { cell, .. }, Focused::Literal { term, context })
        | (Focused::Literal { term, context }, Focused::FreeVar { cell, .. }) => {
            cell.bind(&term, &context, Some(trail));
            true
        }
        (
            Focused::Literal {
                term: term1,
                context: context1,
            },
            Focused::Literal {
                term: term2,
                context: context2,
            },
        ) => unify_literals(&term1, &context1, &term2, &context2, trail),
    }
}

fn unify_literals(
    term1: &Rc<Term>,
    context1: &Rc<Bindings>,
    term2: &Rc<Term>,
    context2: &Rc<Bindings>,
    trail: &mut Trail,
) -> bool {
    // An anonymous variable matches anything, binding nothing.
    if term1.is_anonymous_var() || term2.is_anonymous_var() {
        return true;
    }
    match (&**term1, &**term2) {
        (Term::Int(a), Term::Int(b)) => a == b,
        (Term::Float(a), Term::Float(b)) => a == b,
        (Term::Struct(s1), Term::Struct(s2)) => {
            if s1.name() != s2.name() || s1.arity() != s2.arity() {
                return false;
            }
            s1.args()
                .iter()
                .zip(s2.args())
                .all(|(a1, a2)| unify_resolved(a1, context1, a2, context2, trail))
        }
        (Term::Opaque(o1), Term::Opaque(o2)) => o1.same_value(o2),
        // Distinct kinds never unify; notably Int and Float do not, even
        // when numerically equal.
        _ => false,
    }
}
