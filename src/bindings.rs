use crate::error::EngineError;
use crate::term::{Kind, Struct, Term, TermVisitor, Var};
use crate::trail::Trail;
use indexmap::IndexMap;
use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

/// Link-chain hops after which focusing gives up and reports a cycle.
/// A well-formed chain is always shorter than the number of live cells.
const MAX_CHAIN_HOPS: usize = 1 << 20;

/// Effective state of one variable occurrence.
#[derive(Clone, Default)]
pub enum BindingState {
    /// Unbound.
    #[default]
    Free,
    /// Bound to a literal term, together with the context resolving any
    /// variables nested inside that term.
    Bound {
        /// The literal value.
        term: Rc<Term>,
        /// Context giving meaning to the literal's variables.
        context: Rc<Bindings>,
    },
    /// Aliased to another cell. Chains are acyclic and terminate in a
    /// `Free` or `Bound` cell, because links are only ever created toward
    /// an already dereferenced terminal cell.
    Linked(CellRef),
}

impl fmt::Debug for BindingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Free => f.write_str("Free"),
            Self::Bound { term, .. } => write!(f, "Bound({term})"),
            Self::Linked(cell) => write!(f, "Linked({cell:?})"),
        }
    }
}

/// One mutable binding slot, recording the current state of one variable
/// occurrence plus the originating variable (kept for reporting names in
/// results).
#[derive(Debug, Clone, Default)]
pub struct Binding {
    state: BindingState,
    var: Option<Var>,
}

impl Binding {
    /// Current state of the slot.
    #[must_use]
    pub fn state(&self) -> &BindingState {
        &self.state
    }

    /// Whether the slot is unbound.
    #[must_use]
    pub fn is_free(&self) -> bool {
        matches!(self.state, BindingState::Free)
    }

    /// The variable this slot was created for, when known.
    #[must_use]
    pub fn var(&self) -> Option<&Var> {
        self.var.as_ref()
    }

    /// Reset to `Free`, dropping any reference to a previously bound term,
    /// context or link target.
    pub fn free(&mut self) {
        self.state = BindingState::Free;
    }
}

/// A per-activation store of binding cells, one per variable slot of the
/// owning term template.
///
/// Each activation of a template (e.g. each attempt of a clause) gets a
/// fresh store, so the same immutable template can be in flight many times
/// with independent variable state. Stores are handed around as
/// `Rc<Bindings>` and stay alive as long as any binding cell still points
/// into them.
pub struct Bindings {
    cells: Vec<RefCell<Binding>>,
}

impl Bindings {
    /// Create a store of `size` free cells.
    #[must_use]
    pub fn new(size: usize) -> Rc<Self> {
        Rc::new(Self {
            cells: (0..size).map(|_| RefCell::new(Binding::default())).collect(),
        })
    }

    /// Create a store sized for `template`, recording each slot's variable
    /// so that bindings can later be reported by name.
    ///
    /// When the same variable occurs several times, the last occurrence is
    /// the one recorded.
    #[must_use]
    pub fn for_term(template: &Rc<Term>) -> Rc<Self> {
        struct SlotRecorder {
            vars: Vec<Var>,
        }

        impl TermVisitor<()> for SlotRecorder {
            fn visit_var(&mut self, var: &Var) -> Option<()> {
                if !var.is_anonymous() {
                    self.vars.push(var.clone());
                }
                None
            }
        }

        let mut recorder = SlotRecorder { vars: Vec::new() };
        let _ = template.accept(&mut recorder);

        let size = recorder
            .vars
            .iter()
            .map(|var| var.index() + 1)
            .max()
            .unwrap_or(0);
        let store = Self::new(size);
        for var in recorder.vars {
            let slot = var.index();
            store.cells[slot].borrow_mut().var = Some(var);
        }
        store
    }

    /// Number of variable slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Whether the store has no slots.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Whether the given slot is currently unbound.
    ///
    /// # Panics
    ///
    /// Panics if `slot` is out of range.
    #[must_use]
    pub fn is_free(&self, slot: usize) -> bool {
        self.cells[slot].borrow().is_free()
    }

    /// Walk the link chain starting at `var`'s cell down to its terminal
    /// (`Free` or `Bound`) cell.
    fn terminal_cell(self: &Rc<Self>, var: &Var) -> CellRef {
        let mut cell = CellRef::new(Rc::clone(self), var.index());
        let mut hops = 0usize;
        loop {
            let link = match cell.borrow().state() {
                BindingState::Linked(next) => Some(next.clone()),
                _ => None,
            };
            let Some(next) = link else {
                return cell;
            };
            cell = next;
            hops += 1;
            assert!(
                hops <= MAX_CHAIN_HOPS,
                "cyclic variable link chain reached while dereferencing {}",
                var.name()
            );
        }
    }

    /// Resolve `term` through this context to its ultimate value or to the
    /// still-free variable at the end of its link chain.
    ///
    /// Non-variable terms (and anonymous variables, which have no cell)
    /// focus to themselves. Focusing performs no mutation, so repeated
    /// calls yield the same result.
    ///
    /// # Panics
    ///
    /// Panics if a variable's slot lies outside this store, or if a cyclic
    /// link chain is reached. Both are engine defects, not domain failures.
    #[must_use]
    pub fn focus(self: &Rc<Self>, term: &Rc<Term>) -> Focused {
        let Some(var) = term.as_var() else {
            return Focused::Literal {
                term: Rc::clone(term),
                context: Rc::clone(self),
            };
        };
        if var.is_anonymous() {
            return Focused::Literal {
                term: Rc::clone(term),
                context: Rc::clone(self),
            };
        }

        let cell = self.terminal_cell(var);
        let state = cell.state();
        match state {
            BindingState::Free => {
                // Prefer the identity recorded on the terminal cell; fall
                // back to the variable we walked in from.
                let identity = cell.borrow().var().cloned().unwrap_or_else(|| var.clone());
                Focused::FreeVar {
                    var: identity,
                    cell,
                }
            }
            BindingState::Bound { term, context } => Focused::Literal { term, context },
            BindingState::Linked(_) => unreachable!("terminal cell cannot be linked"),
        }
    }

    /// Focus `term` and require the outcome to satisfy `expected`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotInstantiated`] if the term resolves to a
    /// free variable while a value kind was required, and
    /// [`EngineError::TypeMismatch`] if it resolves to a literal of the
    /// wrong kind. Both are recoverable domain conditions.
    pub fn focus_expect(
        self: &Rc<Self>,
        term: &Rc<Term>,
        expected: Kind,
    ) -> Result<Focused, EngineError> {
        let focused = self.focus(term);
        match &focused {
            Focused::FreeVar { var, .. } if expected != Kind::Var => {
                return Err(EngineError::NotInstantiated {
                    var: var.name().to_string(),
                    expected,
                });
            }
            Focused::Literal { term, .. } if !expected.matches(term) => {
                return Err(EngineError::TypeMismatch {
                    expected,
                    found: term.to_string(),
                });
            }
            _ => {}
        }
        Ok(focused)
    }

    /// Insertion-ordered snapshot of this context's named variables and
    /// their fully resolved values. Still-free variables are omitted.
    #[must_use]
    pub fn named_bindings(self: &Rc<Self>) -> IndexMap<String, Rc<Term>> {
        let mut snapshot = IndexMap::new();
        for slot in 0..self.cells.len() {
            let recorded = self.cells[slot].borrow().var().cloned();
            let Some(var) = recorded else { continue };
            let var_term = Rc::new(Term::Var(var.clone()));
            if let Focused::Literal { term, context } = self.focus(&var_term) {
                snapshot.insert(var.name().to_string(), resolve(&term, &context));
            }
        }
        snapshot
    }
}

impl fmt::Debug for Bindings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = f.debug_list();
        for cell in &self.cells {
            match cell.try_borrow() {
                Ok(binding) => list.entry(&binding.state),
                Err(_) => list.entry(&"<borrowed>"),
            };
        }
        list.finish()
    }
}

/// Stable handle to one binding cell of one context.
///
/// Link targets and trail entries are `CellRef`s, which keeps the aliasing
/// graph an index-to-context relation instead of a web of direct mutable
/// references.
#[derive(Clone)]
pub struct CellRef {
    context: Rc<Bindings>,
    slot: usize,
}

impl CellRef {
    /// Handle to `slot` of `context`.
    ///
    /// # Panics
    ///
    /// Panics if the slot lies outside the context, which means a template
    /// was activated against a store of the wrong size.
    #[must_use]
    pub fn new(context: Rc<Bindings>, slot: usize) -> Self {
        assert!(
            slot < context.len(),
            "variable slot {slot} out of range for a context of {} cells",
            context.len()
        );
        Self { context, slot }
    }

    /// The owning context.
    #[must_use]
    pub fn context(&self) -> &Rc<Bindings> {
        &self.context
    }

    /// The slot within the owning context.
    #[must_use]
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Whether both handles denote the very same cell.
    #[must_use]
    pub fn same_cell(&self, other: &Self) -> bool {
        self.slot == other.slot && Rc::ptr_eq(&self.context, &other.context)
    }

    fn borrow(&self) -> Ref<'_, Binding> {
        self.context.cells[self.slot].borrow()
    }

    fn borrow_mut(&self) -> RefMut<'_, Binding> {
        self.context.cells[self.slot].borrow_mut()
    }

    /// Whether the cell is currently unbound.
    #[must_use]
    pub fn is_free(&self) -> bool {
        self.borrow().is_free()
    }

    /// Snapshot of the cell's current state.
    #[must_use]
    pub fn state(&self) -> BindingState {
        self.borrow().state().clone()
    }

    /// A value copy of the cell, independent of the original.
    #[must_use]
    pub fn snapshot(&self) -> Binding {
        self.borrow().clone()
    }

    /// Reset the cell to `Free`.
    pub fn free(&self) {
        self.borrow_mut().free();
    }

    /// Bind this cell to `term` (interpreted in `term_context`).
    ///
    /// A non-anonymous variable term is dereferenced to its terminal cell
    /// first and aliased with a link; linking a cell to itself is a silent
    /// no-op (the two variables are already unified). Any other term,
    /// including an anonymous variable acting as a placeholder, is stored
    /// as a literal binding. When a trail is supplied the cell is recorded
    /// on it for later undo.
    ///
    /// # Panics
    ///
    /// Panics if the cell is not free: rebinding a bound cell would lose
    /// state that only the trail is allowed to release.
    pub fn bind(&self, term: &Rc<Term>, term_context: &Rc<Bindings>, trail: Option<&mut Trail>) {
        assert!(self.is_free(), "bind on a non-free binding cell");
        let new_state = match term.as_var() {
            Some(var) if !var.is_anonymous() => {
                let target = term_context.terminal_cell(var);
                if target.same_cell(self) {
                    // Already the same binding; a self-link would corrupt
                    // the chain.
                    return;
                }
                BindingState::Linked(target)
            }
            _ => BindingState::Bound {
                term: Rc::clone(term),
                context: Rc::clone(term_context),
            },
        };
        log::trace!("bind {:?} -> {:?}", self, new_state);
        self.borrow_mut().state = new_state;
        if let Some(trail) = trail {
            trail.push(self.clone());
        }
    }
}

impl PartialEq for CellRef {
    fn eq(&self, other: &Self) -> bool {
        self.same_cell(other)
    }
}

impl fmt::Debug for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cell {}@{:p}", self.slot, Rc::as_ptr(&self.context))
    }
}

/// Outcome of focusing a term through a context: either the still-free
/// variable at the end of the chain, or the resolved literal paired with
/// the context that interprets it.
#[derive(Debug, Clone)]
pub enum Focused {
    /// The term resolves to an unbound variable.
    FreeVar {
        /// Identity of the free variable, for reporting and rebuilding.
        var: Var,
        /// The terminal cell, ready to be bound by the caller.
        cell: CellRef,
    },
    /// The term resolves to a literal value.
    Literal {
        /// The resolved term.
        term: Rc<Term>,
        /// Context interpreting the resolved term's variables.
        context: Rc<Bindings>,
    },
}

impl Focused {
    /// Whether the focused term is still a free variable.
    #[must_use]
    pub fn is_free(&self) -> bool {
        matches!(self, Self::FreeVar { .. })
    }

    /// The focused term itself.
    #[must_use]
    pub fn term(&self) -> Rc<Term> {
        match self {
            Self::FreeVar { var, .. } => Rc::new(Term::Var(var.clone())),
            Self::Literal { term, .. } => Rc::clone(term),
        }
    }

    /// The resolved integer value, if the term focused to an `Int`.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Literal { term, .. } => match **term {
                Term::Int(value) => Some(value),
                _ => None,
            },
            Self::FreeVar { .. } => None,
        }
    }

    /// The resolved float value, if the term focused to a `Float`.
    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Literal { term, .. } => match **term {
                Term::Float(value) => Some(value),
                _ => None,
            },
            Self::FreeVar { .. } => None,
        }
    }
}

/// Recursively replace every bound variable in `term` by its value, as
/// seen through `context`. Free variables stay in place, so the result is
/// again a valid template.
#[must_use]
pub fn resolve(term: &Rc<Term>, context: &Rc<Bindings>) -> Rc<Term> {
    match context.focus(term) {
        Focused::FreeVar { var, .. } => Rc::new(Term::Var(var)),
        Focused::Literal { term, context } => match &*term {
            Term::Struct(structure) => {
                let args: Vec<Rc<Term>> = structure
                    .args()
                    .iter()
                    .map(|arg| resolve(arg, &context))
                    .collect();
                Rc::new(Term::Struct(Struct::new(structure.name(), args)))
            }
            _ => Rc::clone(&term),
        },
    }
}

/// First still-unbound variable of `term` as seen through `context`, in
/// left-to-right traversal order, following bindings into whatever
/// contexts they lead.
#[must_use]
pub fn first_free_var(term: &Rc<Term>, context: &Rc<Bindings>) -> Option<Var> {
    struct FreeVarSearch {
        context: Rc<Bindings>,
    }

    impl TermVisitor<Var> for FreeVarSearch {
        fn visit_var(&mut self, var: &Var) -> Option<Var> {
            if var.is_anonymous() {
                return None;
            }
            let var_term = Rc::new(Term::Var(var.clone()));
            match self.context.focus(&var_term) {
                Focused::FreeVar { var, .. } => Some(var),
                Focused::Literal { term, context } => {
                    term.accept(&mut FreeVarSearch { context })
                }
            }
        }
    }

    term.accept(&mut FreeVarSearch {
        context: Rc::clone(context),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::term::Kind;

    #[test]
    fn fresh_store_is_all_free() {
        let store = Bindings::new(3);
        assert_eq!(store.len(), 3);
        for slot in 0..3 {
            assert!(store.is_free(slot));
        }
    }

    #[test]
    fn for_term_sizes_store_and_records_vars() {
        let template = Term::structure(
            "f",
            [Term::var("X", 0), Term::structure("g", [Term::var("Y", 1)])],
        );
        let store = Bindings::for_term(&template);
        assert_eq!(store.len(), 2);
        assert_eq!(
            store.cells[1].borrow().var().map(Var::name),
            Some("Y")
        );
    }

    #[test]
    fn for_term_ignores_anonymous_vars() {
        let template = Term::structure("f", [Term::anonymous()]);
        let store = Bindings::for_term(&template);
        assert!(store.is_empty());
    }

    #[test]
    fn focusing_a_literal_is_the_identity() {
        let store = Bindings::new(0);
        let term = Term::int(5);
        match store.focus(&term) {
            Focused::Literal { term: focused, .. } => assert_eq!(focused, term),
            Focused::FreeVar { .. } => panic!("literal focused to a variable"),
        }
    }

    #[test]
    fn focusing_a_free_var_yields_its_own_cell() {
        let x = Term::var("X", 0);
        let store = Bindings::for_term(&x);
        match store.focus(&x) {
            Focused::FreeVar { var, cell } => {
                assert_eq!(var.name(), "X");
                assert_eq!(cell.slot(), 0);
                assert!(Rc::ptr_eq(cell.context(), &store));
            }
            Focused::Literal { .. } => panic!("free variable focused to a literal"),
        }
    }

    #[test]
    fn focusing_follows_link_chains_to_the_bound_value() {
        let x = Term::var("X", 0);
        let y = Term::var("Y", 1);
        let template = Term::structure("f", [x.clone(), y.clone()]);
        let store = Bindings::for_term(&template);
        let value_store = Bindings::new(0);

        // X -> Y, then Y -> 42.
        CellRef::new(Rc::clone(&store), 0).bind(&y, &store, None);
        CellRef::new(Rc::clone(&store), 1).bind(&Term::int(42), &value_store, None);

        assert_eq!(store.focus(&x).as_int(), Some(42));
        assert_eq!(store.focus(&y).as_int(), Some(42));
    }

    #[test]
    fn focus_is_deterministic_without_mutation() {
        let x = Term::var("X", 0);
        let store = Bindings::for_term(&x);
        CellRef::new(Rc::clone(&store), 0).bind(&Term::int(7), &store, None);

        let first = store.focus(&x).as_int();
        let second = store.focus(&x).as_int();
        assert_eq!(first, Some(7));
        assert_eq!(first, second);
    }

    #[test]
    fn binding_a_var_to_itself_is_a_no_op() {
        let x = Term::var("X", 0);
        let store = Bindings::for_term(&x);
        let mut trail = Trail::new();

        CellRef::new(Rc::clone(&store), 0).bind(&x, &store, Some(&mut trail));

        assert!(store.is_free(0));
        assert!(trail.is_empty());
    }

    #[test]
    #[should_panic(expected = "non-free binding cell")]
    fn binding_a_bound_cell_panics() {
        let x = Term::var("X", 0);
        let store = Bindings::for_term(&x);
        let cell = CellRef::new(Rc::clone(&store), 0);
        cell.bind(&Term::int(1), &store, None);
        cell.bind(&Term::int(2), &store, None);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn slot_outside_the_context_panics() {
        let store = Bindings::new(1);
        let _ = CellRef::new(store, 5);
    }

    #[test]
    fn free_resets_a_bound_cell() {
        let x = Term::var("X", 0);
        let store = Bindings::for_term(&x);
        let cell = CellRef::new(Rc::clone(&store), 0);
        cell.bind(&Term::int(1), &store, None);
        assert!(!cell.is_free());

        cell.free();
        assert!(cell.is_free());
        assert!(store.focus(&x).is_free());
    }

    #[test]
    fn cell_snapshot_is_independent() {
        let x = Term::var("X", 0);
        let store = Bindings::for_term(&x);
        let cell = CellRef::new(Rc::clone(&store), 0);
        cell.bind(&Term::int(9), &store, None);

        let copy = cell.snapshot();
        cell.free();

        assert!(cell.is_free());
        assert!(!copy.is_free());
    }

    #[test]
    fn focus_expect_accepts_matching_kinds() {
        let x = Term::var("X", 0);
        let store = Bindings::for_term(&x);
        CellRef::new(Rc::clone(&store), 0).bind(&Term::int(3), &store, None);

        let focused = store.focus_expect(&x, Kind::Number).expect("an integer is numeric");
        assert_eq!(focused.as_int(), Some(3));
    }

    #[test]
    fn focus_expect_reports_kind_mismatches() {
        let store = Bindings::new(0);
        let err = store
            .focus_expect(&Term::atom("a"), Kind::Number)
            .expect_err("an atom is not numeric");
        assert!(matches!(err, EngineError::TypeMismatch { expected: Kind::Number, .. }));
    }

    #[test]
    fn focus_expect_reports_free_variables() {
        let x = Term::var("X", 0);
        let store = Bindings::for_term(&x);
        let err = store
            .focus_expect(&x, Kind::Int)
            .expect_err("a free variable carries no value");
        assert!(matches!(err, EngineError::NotInstantiated { .. }));
    }

    #[test]
    fn named_bindings_resolve_deeply() {
        let x = Term::var("X", 0);
        let y = Term::var("Y", 1);
        let template = Term::structure("f", [x, y.clone()]);
        let store = Bindings::for_term(&template);

        // X = g(Y), Y = 1: X must report as g(1).
        let g_of_y = Term::structure("g", [y]);
        CellRef::new(Rc::clone(&store), 0).bind(&g_of_y, &store, None);
        CellRef::new(Rc::clone(&store), 1).bind(&Term::int(1), &store, None);

        let snapshot = store.named_bindings();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot["X"].to_string(), "g(1)");
        assert_eq!(snapshot["Y"].to_string(), "1");
    }

    #[test]
    fn named_bindings_skip_free_vars() {
        let template = Term::structure("f", [Term::var("X", 0), Term::var("Y", 1)]);
        let store = Bindings::for_term(&template);
        CellRef::new(Rc::clone(&store), 1).bind(&Term::int(2), &store, None);

        let snapshot = store.named_bindings();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot["Y"].to_string(), "2");
    }

    #[test]
    fn first_free_var_sees_through_bindings() {
        let x = Term::var("X", 0);
        let y = Term::var("Y", 1);
        let template = Term::structure("f", [x.clone(), y]);
        let store = Bindings::for_term(&template);

        let found = first_free_var(&template, &store).expect("X is free");
        assert_eq!(found.name(), "X");

        // After X = 1, the first free variable is Y.
        CellRef::new(Rc::clone(&store), 0).bind(&Term::int(1), &store, None);
        let found = first_free_var(&template, &store).expect("Y is free");
        assert_eq!(found.name(), "Y");
    }

    #[test]
    fn first_free_var_follows_bound_structures() {
        // X = g(Z) where Z stays free in another context.
        let x = Term::var("X", 0);
        let store = Bindings::for_term(&x);
        let z = Term::var("Z", 0);
        let inner = Term::structure("g", [z]);
        let inner_store = Bindings::for_term(&inner);

        CellRef::new(Rc::clone(&store), 0).bind(&inner, &inner_store, None);

        let found = first_free_var(&x, &store).expect("Z is free");
        assert_eq!(found.name(), "Z");
    }

    #[test]
    fn resolve_rebuilds_compound_terms() {
        let x = Term::var("X", 0);
        let template = Term::structure("pair", [x, Term::int(2)]);
        let store = Bindings::for_term(&template);
        CellRef::new(Rc::clone(&store), 0).bind(&Term::int(1), &store, None);

        let resolved = resolve(&template, &store);
        assert_eq!(resolved.to_string(), "pair(1, 2)");
    }
}
