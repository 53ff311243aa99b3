//! Global variable store shared by every task

use crate::domain::entities::Variable;
use crate::domain::errors::MpalError;
use crate::domain::repositories::{ExpressionEvaluator, VariableReader};
use crate::domain::value_objects::{Expression, ItemId, LOCATION_PREFIX, LocationId, VariableName};
use crate::scheduler::lock;
use std::collections::HashMap;
use std::sync::Mutex;

/// Fixed set of named integer registers
///
/// The set of names is decided at load time; only values change afterwards.
/// Every operation takes the lock once and never suspends while holding it.
pub struct VariableStore {
    slots: Mutex<Vec<Variable>>,
    index: HashMap<VariableName, usize>,
}

struct LockedReader<'a> {
    slots: &'a [Variable],
    index: &'a HashMap<VariableName, usize>,
}

impl VariableReader for LockedReader<'_> {
    fn read(&self, name: &VariableName) -> Option<i32> {
        self.index.get(name).map(|&slot| self.slots[slot].value)
    }
}

impl VariableStore {
    pub fn new(variables: Vec<Variable>) -> Self {
        let index = variables
            .iter()
            .enumerate()
            .map(|(slot, variable)| (variable.name.clone(), slot))
            .collect();
        Self {
            slots: Mutex::new(variables),
            index,
        }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn contains(&self, name: &VariableName) -> bool {
        self.index.contains_key(name)
    }

    pub fn get(&self, name: &VariableName) -> Option<i32> {
        let slot = *self.index.get(name)?;
        Some(lock(&self.slots)[slot].value)
    }

    /// Write an existing variable
    pub fn set(&self, name: &VariableName, value: i32) -> Result<(), MpalError> {
        let slot = *self
            .index
            .get(name)
            .ok_or_else(|| MpalError::not_found(format!("variable '{name}'")))?;
        lock(&self.slots)[slot].value = value;
        Ok(())
    }

    /// Evaluate `expr` against a consistent view of the store
    pub fn evaluate(
        &self,
        evaluator: &dyn ExpressionEvaluator,
        expr: &Expression,
    ) -> Result<i32, MpalError> {
        let slots = lock(&self.slots);
        evaluator.evaluate(
            expr,
            &LockedReader {
                slots: &slots,
                index: &self.index,
            },
        )
    }

    /// Evaluate `expr` and store the result in `name` without releasing the lock in between
    pub fn assign(
        &self,
        evaluator: &dyn ExpressionEvaluator,
        name: &VariableName,
        expr: &Expression,
    ) -> Result<i32, MpalError> {
        let slot = *self
            .index
            .get(name)
            .ok_or_else(|| MpalError::unknown_variable(name.clone()))?;
        let mut slots = lock(&self.slots);
        let value = evaluator.evaluate(
            expr,
            &LockedReader {
                slots: &slots,
                index: &self.index,
            },
        )?;
        slots[slot].value = value;
        Ok(value)
    }

    /// Items whose `Location.<item>` variable equals `location`, in table order
    pub fn items_in_location(&self, location: LocationId) -> Vec<ItemId> {
        let wanted = location.get() as i32;
        lock(&self.slots)
            .iter()
            .filter(|variable| variable.value == wanted)
            .filter_map(|variable| variable.name.item_suffix(LOCATION_PREFIX))
            .collect()
    }

    /// Copy of every variable in table order
    pub fn snapshot(&self) -> Vec<Variable> {
        lock(&self.slots).clone()
    }

    /// Overwrite all values in table order; `values` must match the table length
    pub(crate) fn restore(&self, values: &[i32]) -> Result<(), MpalError> {
        let mut slots = lock(&self.slots);
        if values.len() != slots.len() {
            return Err(MpalError::SizeMismatch {
                expected: slots.len(),
                actual: values.len(),
            });
        }
        for (variable, &value) in slots.iter_mut().zip(values) {
            variable.value = value;
        }
        Ok(())
    }
}
