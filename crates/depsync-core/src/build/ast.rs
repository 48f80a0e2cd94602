//! AST for the consumed BUILD-file subset.
//!
//! Only the shapes the engine reads or writes are modeled: rule calls with
//! string/list/bool attributes, assignments, lists, dicts, identifiers and
//! the `+`/`-` operators over source-list expressions. Anything else a
//! build file may contain is outside the subset and never round-trips
//! through this tool.

/// A top-level statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// A call statement, e.g. a rule declaration or `subinclude(...)`
    Call(CallExpr),
    /// An assignment, e.g. `SRCS = ["a.go"]`
    Assign { name: String, value: Expr },
    /// Any other expression kept verbatim (docstrings and the like)
    Expr(Expr),
}

/// A function call with positional and keyword arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct CallExpr {
    pub name: String,
    pub args: Vec<Arg>,
}

/// One call argument; `name` is set for keyword arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct Arg {
    pub name: Option<String>,
    pub value: Expr,
}

/// An expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Str(String),
    Int(i64),
    Bool(bool),
    None,
    Ident(String),
    List(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    Call(Box<CallExpr>),
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

/// Binary operators over source-list expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    /// Set union
    Add,
    /// Set difference
    Sub,
}

impl Expr {
    /// Build a list of string literals.
    pub fn str_list<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Expr::List(items.into_iter().map(|s| Expr::Str(s.into())).collect())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Expr::Str(s) => Some(s),
            _ => None,
        }
    }

    /// The string elements of a literal list. `None` when the expression is
    /// not a list; non-string elements are skipped.
    pub fn as_str_list(&self) -> Option<Vec<String>> {
        match self {
            Expr::List(items) => Some(
                items
                    .iter()
                    .filter_map(|e| e.as_str().map(str::to_string))
                    .collect(),
            ),
            _ => None,
        }
    }
}

impl CallExpr {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }

    /// Append a keyword argument; builder-style.
    pub fn with_attr(mut self, name: impl Into<String>, value: Expr) -> Self {
        self.args.push(Arg {
            name: Some(name.into()),
            value,
        });
        self
    }

    /// The value of a keyword argument.
    pub fn attr(&self, name: &str) -> Option<&Expr> {
        self.args
            .iter()
            .find(|a| a.name.as_deref() == Some(name))
            .map(|a| &a.value)
    }

    pub fn attr_mut(&mut self, name: &str) -> Option<&mut Expr> {
        self.args
            .iter_mut()
            .find(|a| a.name.as_deref() == Some(name))
            .map(|a| &mut a.value)
    }

    /// Set a keyword argument, replacing any existing value.
    pub fn set_attr(&mut self, name: &str, value: Expr) {
        match self.attr_mut(name) {
            Some(slot) => *slot = value,
            None => self.args.push(Arg {
                name: Some(name.to_string()),
                value,
            }),
        }
    }

    /// Remove a keyword argument; returns whether it existed.
    pub fn remove_attr(&mut self, name: &str) -> bool {
        let before = self.args.len();
        self.args.retain(|a| a.name.as_deref() != Some(name));
        self.args.len() != before
    }

    /// A string-valued attribute.
    pub fn str_attr(&self, name: &str) -> Option<&str> {
        self.attr(name).and_then(Expr::as_str)
    }

    /// A literal-list attribute's string elements.
    pub fn str_list_attr(&self, name: &str) -> Option<Vec<String>> {
        self.attr(name).and_then(Expr::as_str_list)
    }

    /// A boolean attribute; absent means false.
    pub fn bool_attr(&self, name: &str) -> bool {
        matches!(self.attr(name), Some(Expr::Bool(true)))
    }

    /// The positional argument at `idx`.
    pub fn positional(&self, idx: usize) -> Option<&Expr> {
        self.args
            .iter()
            .filter(|a| a.name.is_none())
            .nth(idx)
            .map(|a| &a.value)
    }

    /// The rule name. Rule calls always carry a `name` attribute.
    pub fn rule_name(&self) -> &str {
        self.str_attr("name").unwrap_or_default()
    }
}
