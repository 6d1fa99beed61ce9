use crate::bindings::Bindings;
use crate::error::EngineError;
use crate::term::{Kind, Term};
use crate::trail::Trail;
use crate::unify::unify;
use std::rc::Rc;

/// Continuation handed to a primitive: receives candidate solutions one at
/// a time, while the bindings describing the solution are in place.
///
/// Any `FnMut(&mut Trail) -> bool` closure is a listener.
pub trait SolutionListener {
    /// A solution is available now, readable through the current
    /// bindings. The active trail is passed along so the listener may
    /// itself run nested proof attempts under it; whatever it leaves
    /// recorded is unwound by the caller's pending undo. Return `true`
    /// to request further solutions.
    fn on_solution(&mut self, trail: &mut Trail) -> bool;
}

impl<F: FnMut(&mut Trail) -> bool> SolutionListener for F {
    fn on_solution(&mut self, trail: &mut Trail) -> bool {
        self(trail)
    }
}

/// Signature a primitive predicate exposes to the external dispatcher:
/// a continuation, the active trail, the caller's context and the goal
/// arguments. Enumeration happens through the listener; the `Result` only
/// carries domain errors such as type mismatches on the arguments.
pub type Primitive = fn(
    &mut dyn SolutionListener,
    &mut Trail,
    &Rc<Bindings>,
    &[Rc<Term>],
) -> Result<(), EngineError>;

/// Drive one candidate through the unify/notify/undo cycle.
///
/// Takes a checkpoint, unifies both sides under `trail`, notifies the
/// listener if (and only if) unification succeeded, then undoes back to
/// the checkpoint regardless of the outcome so the next candidate starts
/// from a clean state. Returns whether enumeration should continue: a
/// failed candidate never stops it, only the listener can.
pub fn unify_and_notify(
    listener: &mut dyn SolutionListener,
    trail: &mut Trail,
    term1: &Rc<Term>,
    context1: &Rc<Bindings>,
    term2: &Rc<Term>,
    context2: &Rc<Bindings>,
) -> bool {
    let checkpoint = trail.mark();
    let unified = unify(term1, context1, term2, context2, trail);
    let more = if unified {
        listener.on_solution(trail)
    } else {
        true
    };
    trail.undo_to(checkpoint);
    more
}

/// `int_range(Low, X, High)`: enumerate the integers from `Low` to `High`
/// inclusive, in increasing order, unifying each with `X`.
///
/// The canonical bounded generator: one unify/notify/undo cycle per
/// candidate. The bindings of a delivered solution are undone before the
/// next candidate (and before returning when the listener declines more),
/// so after the call the iterated variable is free again unless the
/// listener captured the value itself. An empty range (`Low > High`)
/// simply produces no solution.
///
/// # Errors
///
/// Returns a domain error when either bound does not resolve to an
/// integer literal.
pub fn int_range(
    listener: &mut dyn SolutionListener,
    trail: &mut Trail,
    context: &Rc<Bindings>,
    low: &Rc<Term>,
    iterable: &Rc<Term>,
    high: &Rc<Term>,
) -> Result<(), EngineError> {
    let lower = int_argument(context, low)?;
    let upper = int_argument(context, high)?;
    log::debug!("int_range enumerating {lower}..={upper}");

    for value in lower..=upper {
        let candidate = Term::int(value);
        if !unify_and_notify(listener, trail, iterable, context, &candidate, context) {
            break;
        }
    }
    Ok(())
}

fn int_argument(context: &Rc<Bindings>, term: &Rc<Term>) -> Result<i64, EngineError> {
    let focused = context.focus_expect(term, Kind::Int)?;
    Ok(focused
        .as_int()
        .expect("kind-checked focusing yields an integer literal"))
}
