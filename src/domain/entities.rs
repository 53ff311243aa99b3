//! Domain entities - Resource tables loaded into a runtime

use crate::domain::errors::*;
use crate::domain::value_objects::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Longest variable name that fits a save record (33 bytes with the terminator)
pub const MAX_VARIABLE_NAME_LEN: usize = 32;

/// A named global integer register
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    pub name: VariableName,
    #[serde(default)]
    pub value: i32,
}

impl Variable {
    pub fn new(name: impl Into<VariableName>, value: i32) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// A message string addressed by number
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: u32,
    pub text: String,
}

/// An item together with the actions it responds to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub actions: Vec<Action>,
}

impl Item {
    pub fn new(id: ItemId, actions: Vec<Action>) -> Self {
        Self {
            id,
            name: None,
            actions,
        }
    }

    pub fn has_idle_actions(&self) -> bool {
        self.actions.iter().any(|action| action.idle.is_some())
    }

    /// Copy of this item keeping only the action at `index`
    pub fn with_single_action(&self, index: usize) -> Option<Item> {
        let action = self.actions.get(index)?.clone();
        Some(Item {
            id: self.id,
            name: self.name.clone(),
            actions: vec![action],
        })
    }
}

/// Background firing parameters of an idle action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdleSpec {
    /// Interval between deadlines, in milliseconds
    pub time_ms: u64,
    /// Chance to fire at each deadline, 0..=100
    pub percent: u8,
}

/// One action of an item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub trigger: u32,
    #[serde(default)]
    pub param: u32,
    #[serde(default)]
    pub when: Option<Expression>,
    #[serde(default)]
    pub idle: Option<IdleSpec>,
    #[serde(default)]
    pub commands: Vec<Command>,
}

impl Action {
    pub fn new(trigger: u32, param: u32, commands: Vec<Command>) -> Self {
        Self {
            trigger,
            param,
            when: None,
            idle: None,
            commands,
        }
    }

    pub fn with_when(mut self, when: Expression) -> Self {
        self.when = Some(when);
        self
    }

    pub fn with_idle(mut self, time_ms: u64, percent: u8) -> Self {
        self.idle = Some(IdleSpec { time_ms, percent });
        self
    }

    pub fn is_idle(&self) -> bool {
        self.idle.is_some()
    }
}

/// When a script moment fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FireTime {
    /// Milliseconds after the script (or the last barrier) started
    At(u64),
    /// After every custom call of the previous moment has finished
    JoinPrevious,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Moment {
    pub time: FireTime,
    #[serde(default)]
    pub commands: Vec<Command>,
}

impl Moment {
    pub fn at(time_ms: u64, commands: Vec<Command>) -> Self {
        Self {
            time: FireTime::At(time_ms),
            commands,
        }
    }

    pub fn join_previous(commands: Vec<Command>) -> Self {
        Self {
            time: FireTime::JoinPrevious,
            commands,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Script {
    pub id: ScriptId,
    #[serde(default)]
    pub moments: Vec<Moment>,
}

/// A line of dialog text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
    pub id: u32,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    #[serde(default)]
    pub commands: Vec<GroupCommand>,
}

/// One option of a choice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Select {
    pub data: i32,
    #[serde(default)]
    pub when: Option<Expression>,
    #[serde(default)]
    pub groups: Vec<GroupId>,
    #[serde(default)]
    pub ends_choice: bool,
    #[serde(default)]
    pub ends_dialog: bool,
}

impl Select {
    pub fn new(data: i32, groups: Vec<GroupId>) -> Self {
        Self {
            data,
            when: None,
            groups,
            ends_choice: false,
            ends_dialog: false,
        }
    }

    pub fn with_when(mut self, when: Expression) -> Self {
        self.when = Some(when);
        self
    }

    pub fn ending_choice(mut self) -> Self {
        self.ends_choice = true;
        self
    }

    pub fn ending_dialog(mut self) -> Self {
        self.ends_dialog = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    pub id: ChoiceId,
    #[serde(default)]
    pub selects: Vec<Select>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dialog {
    pub id: DialogId,
    #[serde(default)]
    pub periods: Vec<Period>,
    #[serde(default)]
    pub groups: Vec<Group>,
    #[serde(default)]
    pub choices: Vec<Choice>,
}

impl Dialog {
    pub fn group(&self, id: GroupId) -> Option<&Group> {
        self.groups.iter().find(|group| group.id == id)
    }

    pub fn choice(&self, id: ChoiceId) -> Option<&Choice> {
        self.choices.iter().find(|choice| choice.id == id)
    }

    pub fn period(&self, id: u32) -> Option<&Period> {
        self.periods.iter().find(|period| period.id == id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub id: LocationId,
}

/// The already-parsed resource tables a runtime is built from
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceTables {
    #[serde(default)]
    pub variables: Vec<Variable>,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub dialogs: Vec<Dialog>,
    #[serde(default)]
    pub items: Vec<Item>,
    #[serde(default)]
    pub locations: Vec<Location>,
    #[serde(default)]
    pub scripts: Vec<Script>,
}

impl ResourceTables {
    pub fn item(&self, id: ItemId) -> Option<&Item> {
        self.items.iter().find(|item| item.id == id)
    }

    pub fn dialog(&self, id: DialogId) -> Option<&Dialog> {
        self.dialogs.iter().find(|dialog| dialog.id == id)
    }

    pub fn script(&self, id: ScriptId) -> Option<&Script> {
        self.scripts.iter().find(|script| script.id == id)
    }

    pub fn message(&self, id: u32) -> Option<&Message> {
        self.messages.iter().find(|message| message.id == id)
    }

    /// Check the invariants the runtime relies on
    pub fn validate(&self) -> Result<(), MpalError> {
        let mut names = HashSet::new();
        for variable in &self.variables {
            if variable.name.as_str().len() > MAX_VARIABLE_NAME_LEN {
                return Err(MpalError::consistency(format!(
                    "variable name '{}' exceeds {} bytes",
                    variable.name, MAX_VARIABLE_NAME_LEN
                )));
            }
            if !names.insert(&variable.name) {
                return Err(MpalError::consistency(format!(
                    "duplicate variable '{}'",
                    variable.name
                )));
            }
        }

        ensure_unique(self.items.iter().map(|item| item.id), "item")?;
        ensure_unique(self.dialogs.iter().map(|dialog| dialog.id), "dialog")?;
        ensure_unique(self.scripts.iter().map(|script| script.id), "script")?;
        ensure_unique(self.locations.iter().map(|location| location.id), "location")?;

        for dialog in &self.dialogs {
            ensure_unique(dialog.groups.iter().map(|group| group.id), "dialog group")?;
            ensure_unique(dialog.choices.iter().map(|choice| choice.id), "dialog choice")?;
        }

        for item in &self.items {
            for action in &item.actions {
                if let Some(idle) = action.idle
                    && idle.percent > 100
                {
                    return Err(MpalError::consistency(format!(
                        "item {} idle percent {} is above 100",
                        item.id, idle.percent
                    )));
                }
            }
        }

        Ok(())
    }
}

fn ensure_unique<T>(ids: impl Iterator<Item = T>, kind: &str) -> Result<(), MpalError>
where
    T: std::hash::Hash + Eq + std::fmt::Display,
{
    let mut seen = HashSet::new();
    for id in ids {
        if seen.contains(&id) {
            return Err(MpalError::consistency(format!("duplicate {kind} {id}")));
        }
        seen.insert(id);
    }
    Ok(())
}
