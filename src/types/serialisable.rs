/// Types implementing WireSerialisable can be written back to a client over
/// the line protocol.
pub trait WireSerialisable {
    /// Converts the value in question to one or more CRLF-terminated lines.
    fn serialise_wire(&self) -> Vec<u8>;
}
