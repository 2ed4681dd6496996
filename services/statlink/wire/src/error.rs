//! Wire protocol error types.

use thiserror::Error;

/// Wire protocol errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    /// Not enough bytes to decode the requested field
    #[error("incomplete: need {needed} bytes, have {available}")]
    Incomplete {
        /// Bytes required by the field
        needed: usize,
        /// Bytes left in the buffer
        available: usize,
    },

    /// Size limit exceeded
    #[error("size limit exceeded: {0}")]
    Size(usize),

    /// Header magic does not match the protocol constant
    #[error("bad magic {0:#06x}")]
    Magic(u16),

    /// Malformed payload content
    #[error("malformed: {0}")]
    Malformed(&'static str),
}

/// Ensure `buf` holds at least `needed` bytes.
pub(crate) fn need(buf: &[u8], needed: usize) -> Result<(), WireError> {
    if buf.len() < needed {
        return Err(WireError::Incomplete {
            needed,
            available: buf.len(),
        });
    }
    Ok(())
}
