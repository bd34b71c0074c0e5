//! md5sum helpers.
//!
//! ROS identifies message schema compatibility at handshake time by comparing an md5sum
//! computed from a message's (recursively flattened) field types and names. Full
//! computation from `.msg` source is part of code-generation and out of scope here; this
//! module exposes the primitive both the codegen and the TCPROS handshake need: hashing an
//! already-flattened definition string into the hex digest ROS sends over the wire.

/// Computes the ROS md5sum of an already-flattened message definition string.
///
/// The input is expected to already have comments stripped and dependent message
/// definitions inlined, per the ROS message md5sum algorithm; this function performs only
/// the final hashing step.
pub fn compute(flattened_definition: &str) -> String {
    let digest = md5::compute(flattened_definition.as_bytes());
    format!("{digest:x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_digest() {
        // std_msgs/String's on-the-wire definition is a single `string data` field, with
        // no trailing newline, per the ROS genmsg md5sum convention for leaf fields.
        assert_eq!(compute("string data"), "992ce8a1687cec8c8bd883ec73ca41d1");
    }

    #[test]
    fn differs_for_different_input() {
        assert_ne!(compute("string data\n"), compute("int32 data\n"));
    }
}
