//! Storage module for saving and restoring the variable store
//!
//! The layout is a little-endian `u32` count followed by one fixed-size
//! record per variable in table order: the `i32` value, then the name in 33
//! NUL-padded bytes. Restoring requires the same table on both ends.

use crate::domain::entities::MAX_VARIABLE_NAME_LEN;
use crate::domain::errors::MpalError;
use crate::runtime::VariableStore;
use byteorder::{ByteOrder, LittleEndian};

const COUNT_LEN: usize = 4;
const NAME_LEN: usize = MAX_VARIABLE_NAME_LEN + 1;
/// Size of one variable record
pub const RECORD_LEN: usize = 4 + NAME_LEN;

/// Bytes needed to save a table of `count` variables
pub fn state_size(count: usize) -> usize {
    COUNT_LEN + count * RECORD_LEN
}

/// Dump every variable in table order
pub fn save_state(store: &VariableStore) -> Vec<u8> {
    let variables = store.snapshot();
    let mut bytes = vec![0u8; state_size(variables.len())];
    LittleEndian::write_u32(&mut bytes[..COUNT_LEN], variables.len() as u32);

    for (record, variable) in bytes[COUNT_LEN..]
        .chunks_exact_mut(RECORD_LEN)
        .zip(&variables)
    {
        LittleEndian::write_i32(&mut record[..4], variable.value);
        // Names are validated to fit at load time; the tail stays NUL
        let name = variable.name.as_str().as_bytes();
        let len = name.len().min(MAX_VARIABLE_NAME_LEN);
        record[4..4 + len].copy_from_slice(&name[..len]);
    }

    bytes
}

/// Restore values saved by [`save_state`] into `store`
pub fn load_state(store: &VariableStore, bytes: &[u8]) -> Result<(), MpalError> {
    let expected = state_size(store.len());
    if bytes.len() < COUNT_LEN {
        return Err(MpalError::SizeMismatch {
            expected,
            actual: bytes.len(),
        });
    }

    let count = LittleEndian::read_u32(&bytes[..COUNT_LEN]) as usize;
    if count != store.len() || bytes.len() != expected {
        return Err(MpalError::SizeMismatch {
            expected,
            actual: bytes.len(),
        });
    }

    let live = store.snapshot();
    let mut values = Vec::with_capacity(count);
    for (index, (record, variable)) in bytes[COUNT_LEN..]
        .chunks_exact(RECORD_LEN)
        .zip(&live)
        .enumerate()
    {
        let name = decode_name(&record[4..]);
        if name != variable.name.as_str() {
            return Err(MpalError::StateMismatch {
                index,
                expected: variable.name.to_string(),
                actual: name,
            });
        }
        values.push(LittleEndian::read_i32(&record[..4]));
    }

    store.restore(&values)?;
    log::debug!("restored {count} variables");
    Ok(())
}

fn decode_name(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}
