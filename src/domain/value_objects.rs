//! Domain value objects - Identifiers, commands and expressions

use serde::{Deserialize, Serialize};

/// Macro to implement common traits for numeric identifier types
macro_rules! impl_numeric_id {
    ($type:ident) => {
        impl $type {
            pub const fn new(id: u32) -> Self {
                Self(id)
            }

            pub const fn get(self) -> u32 {
                self.0
            }
        }

        impl From<u32> for $type {
            fn from(id: u32) -> Self {
                Self(id)
            }
        }

        impl std::fmt::Display for $type {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

/// Item (object) number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(u32);

impl_numeric_id!(ItemId);

/// Location number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocationId(u32);

impl_numeric_id!(LocationId);

/// Dialog number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DialogId(u32);

impl_numeric_id!(DialogId);

/// Group number inside a dialog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(u32);

impl_numeric_id!(GroupId);

/// Choice number inside a dialog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChoiceId(u32);

impl_numeric_id!(ChoiceId);

/// Script number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScriptId(u32);

impl_numeric_id!(ScriptId);

/// Index of a host-supplied custom function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FunctionIndex(u32);

impl_numeric_id!(FunctionIndex);

/// Name of a global variable
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariableName(String);

impl VariableName {
    pub fn new(name: String) -> Self {
        Self(name)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of the variable holding the status of `item`
    pub fn status_of(item: ItemId) -> Self {
        Self(format!("{STATUS_PREFIX}{item}"))
    }

    /// Item number encoded after `prefix`, if the name follows that convention
    pub fn item_suffix(&self, prefix: &str) -> Option<ItemId> {
        self.0
            .strip_prefix(prefix)
            .and_then(|rest| rest.parse::<u32>().ok())
            .map(ItemId)
    }
}

impl From<String> for VariableName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for VariableName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for VariableName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub const STATUS_PREFIX: &str = "Status.";
pub const LOCATION_PREFIX: &str = "Location.";
pub const PATTERN_PREFIX: &str = "Pattern.";

/// Precondition / assignment expression
///
/// The compiled resource format stores these as opaque blobs. The runtime only
/// hands them to an [`ExpressionEvaluator`](crate::domain::repositories::ExpressionEvaluator);
/// this tree is the form the bundled evaluator understands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expression {
    Const(i32),
    Var(VariableName),
    Not(Box<Expression>),
    Neg(Box<Expression>),
    Binary {
        op: BinaryOp,
        lhs: Box<Expression>,
        rhs: Box<Expression>,
    },
}

impl Expression {
    pub fn var(name: impl Into<VariableName>) -> Self {
        Self::Var(name.into())
    }

    pub fn binary(op: BinaryOp, lhs: Expression, rhs: Expression) -> Self {
        Self::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn equals(lhs: Expression, rhs: Expression) -> Self {
        Self::binary(BinaryOp::Eq, lhs, rhs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

/// Arguments passed to a custom function
pub type CustomArgs = [i32; 4];

/// A single command of an action or script moment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    CustomCall {
        function: FunctionIndex,
        #[serde(default)]
        args: CustomArgs,
    },
    VarAssign {
        name: VariableName,
        value: Expression,
    },
}

/// A command inside a dialog group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GroupCommand {
    CustomCall {
        function: FunctionIndex,
        #[serde(default)]
        args: CustomArgs,
    },
    VarAssign {
        name: VariableName,
        value: Expression,
    },
    DoChoice {
        choice: ChoiceId,
    },
}

impl From<Command> for GroupCommand {
    fn from(command: Command) -> Self {
        match command {
            Command::CustomCall { function, args } => GroupCommand::CustomCall { function, args },
            Command::VarAssign { name, value } => GroupCommand::VarAssign { name, value },
        }
    }
}
