use smallvec::SmallVec;
use std::any::Any;
use std::fmt;
use std::rc::Rc;

/// Name under which anonymous ("don't care") variables are written.
pub const ANONYMOUS_NAME: &str = "_";

/// A logic variable as it occurs in a term template.
///
/// The `index` addresses the variable's binding slot in the context created
/// for one activation of the owning template. Anonymous variables carry no
/// slot and never bind.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Var {
    name: String,
    index: usize,
    anonymous: bool,
}

impl Var {
    /// Create a named variable for the given slot. A variable named `_`
    /// is anonymous.
    #[must_use]
    pub fn new(name: impl Into<String>, index: usize) -> Self {
        let name = name.into();
        let anonymous = name == ANONYMOUS_NAME;
        Self {
            name,
            index,
            anonymous,
        }
    }

    /// Create an anonymous variable.
    #[must_use]
    pub fn anonymous() -> Self {
        Self {
            name: ANONYMOUS_NAME.to_string(),
            index: usize::MAX,
            anonymous: true,
        }
    }

    /// The variable's name, used for reporting bindings.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Slot of this variable in its owning template's context.
    /// Meaningless for anonymous variables.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Whether this is a don't-care variable.
    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        self.anonymous
    }
}

/// A compound term: a functor name and its ordered arguments.
///
/// A `Struct` of arity 0 represents a plain atom.
#[derive(Debug, Clone, PartialEq)]
pub struct Struct {
    name: String,
    args: SmallVec<[Rc<Term>; 4]>,
}

impl Struct {
    /// Create a compound term from a functor name and arguments.
    #[must_use]
    pub fn new(name: impl Into<String>, args: impl IntoIterator<Item = Rc<Term>>) -> Self {
        Self {
            name: name.into(),
            args: args.into_iter().collect(),
        }
    }

    /// The functor name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of arguments.
    #[must_use]
    pub fn arity(&self) -> usize {
        self.args.len()
    }

    /// The ordered arguments.
    #[must_use]
    pub fn args(&self) -> &[Rc<Term>] {
        &self.args
    }
}

/// An arbitrary host value carried inside a term, opaque to structural
/// traversal and to unification (which compares payload identity only).
#[derive(Clone)]
pub struct Opaque {
    value: Rc<dyn Any>,
}

impl Opaque {
    /// Wrap a host value.
    #[must_use]
    pub fn new<T: 'static>(value: T) -> Self {
        Self {
            value: Rc::new(value),
        }
    }

    /// Borrow the payload as a concrete type, if it has that type.
    #[must_use]
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.value.downcast_ref()
    }

    /// Whether both wrappers hold the very same host value.
    #[must_use]
    pub fn same_value(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.value, &other.value)
    }
}

impl PartialEq for Opaque {
    fn eq(&self, other: &Self) -> bool {
        self.same_value(other)
    }
}

impl fmt::Debug for Opaque {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Opaque(<host value>)")
    }
}

/// An immutable logic term.
///
/// Templates never change shape once built; all variability lives in the
/// binding state outside the term, so one template can be shared across
/// unlimited concurrent activations.
#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    /// A logic variable.
    Var(Var),
    /// An integer literal.
    Int(i64),
    /// A floating-point literal. Never unifies with `Int`.
    Float(f64),
    /// A compound term or (at arity 0) an atom.
    Struct(Struct),
    /// An opaque host value.
    Opaque(Opaque),
}

impl Term {
    /// Shorthand for a shared variable term.
    #[must_use]
    pub fn var(name: impl Into<String>, index: usize) -> Rc<Self> {
        Rc::new(Self::Var(Var::new(name, index)))
    }

    /// Shorthand for a shared anonymous-variable term.
    #[must_use]
    pub fn anonymous() -> Rc<Self> {
        Rc::new(Self::Var(Var::anonymous()))
    }

    /// Shorthand for a shared integer term.
    #[must_use]
    pub fn int(value: i64) -> Rc<Self> {
        Rc::new(Self::Int(value))
    }

    /// Shorthand for a shared float term.
    #[must_use]
    pub fn float(value: f64) -> Rc<Self> {
        Rc::new(Self::Float(value))
    }

    /// Shorthand for a shared atom (0-arity compound).
    #[must_use]
    pub fn atom(name: impl Into<String>) -> Rc<Self> {
        Rc::new(Self::Struct(Struct::new(name, [])))
    }

    /// Shorthand for a shared compound term.
    #[must_use]
    pub fn structure(
        name: impl Into<String>,
        args: impl IntoIterator<Item = Rc<Self>>,
    ) -> Rc<Self> {
        Rc::new(Self::Struct(Struct::new(name, args)))
    }

    /// Shorthand for a shared opaque term.
    #[must_use]
    pub fn opaque<T: 'static>(value: T) -> Rc<Self> {
        Rc::new(Self::Opaque(Opaque::new(value)))
    }

    /// The variable inside this term, if it is one.
    #[must_use]
    pub fn as_var(&self) -> Option<&Var> {
        match self {
            Self::Var(var) => Some(var),
            _ => None,
        }
    }

    /// Whether this term is an anonymous variable.
    #[must_use]
    pub fn is_anonymous_var(&self) -> bool {
        matches!(self, Self::Var(var) if var.is_anonymous())
    }

    /// The shape class of this term.
    #[must_use]
    pub fn kind(&self) -> Kind {
        match self {
            Self::Var(_) => Kind::Var,
            Self::Int(_) => Kind::Int,
            Self::Float(_) => Kind::Float,
            Self::Struct(_) => Kind::Struct,
            Self::Opaque(_) => Kind::Opaque,
        }
    }

    /// Double-dispatch into the matching `visit_*` method.
    pub fn accept<T, V>(&self, visitor: &mut V) -> Option<T>
    where
        V: TermVisitor<T> + ?Sized,
    {
        match self {
            Self::Var(var) => visitor.visit_var(var),
            Self::Int(value) => visitor.visit_int(*value),
            Self::Float(value) => visitor.visit_float(*value),
            Self::Struct(structure) => visitor.visit_struct(structure),
            Self::Opaque(opaque) => visitor.visit_opaque(opaque),
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Var(var) => f.write_str(var.name()),
            Self::Int(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value:?}"),
            Self::Struct(structure) => {
                f.write_str(structure.name())?;
                if structure.arity() > 0 {
                    f.write_str("(")?;
                    for (i, arg) in structure.args().iter().enumerate() {
                        if i > 0 {
                            f.write_str(", ")?;
                        }
                        write!(f, "{arg}")?;
                    }
                    f.write_str(")")?;
                }
                Ok(())
            }
            Self::Opaque(_) => f.write_str("<opaque>"),
        }
    }
}

/// The shape classes a focused term can be checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// A (free) variable.
    Var,
    /// An integer literal.
    Int,
    /// A float literal.
    Float,
    /// Either numeric kind.
    Number,
    /// A compound term or atom.
    Struct,
    /// An opaque host value.
    Opaque,
}

impl Kind {
    /// Whether `term` satisfies this kind requirement.
    #[must_use]
    pub fn matches(self, term: &Term) -> bool {
        match self {
            Self::Number => matches!(term, Term::Int(_) | Term::Float(_)),
            _ => term.kind() == self,
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Var => "variable",
            Self::Int => "integer",
            Self::Float => "float",
            Self::Number => "numeric",
            Self::Struct => "compound",
            Self::Opaque => "opaque",
        };
        f.write_str(name)
    }
}

/// Generic visitor over the closed set of term variants.
///
/// The default methods implement the shared search-style traversal: leaves
/// yield no result, a compound visits its children in order and
/// short-circuits on the first `Some`, and opaque payloads are never
/// recursed into. Override the methods of interest.
pub trait TermVisitor<T> {
    /// Visit a variable.
    fn visit_var(&mut self, _var: &Var) -> Option<T> {
        None
    }

    /// Visit an integer literal.
    fn visit_int(&mut self, _value: i64) -> Option<T> {
        None
    }

    /// Visit a float literal.
    fn visit_float(&mut self, _value: f64) -> Option<T> {
        None
    }

    /// Visit a compound term. Delegates to all subterms until the first
    /// one yields a result.
    fn visit_struct(&mut self, structure: &Struct) -> Option<T> {
        for arg in structure.args() {
            let result = arg.accept(self);
            if result.is_some() {
                return result;
            }
        }
        None
    }

    /// Visit an opaque value. Its payload is not term-shaped, so there is
    /// nothing to recurse into.
    fn visit_opaque(&mut self, _opaque: &Opaque) -> Option<T> {
        None
    }
}
