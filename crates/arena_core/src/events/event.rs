use crate::wire::WireCodec;

/// Marker for types that can be sent and received as room events.
///
/// Events are identified on the wire by a numeric code, not by type, so any
/// [`WireCodec`] type qualifies. Implemented automatically; user types only
/// need a `WireCodec` impl.
///
/// # Examples
///
/// ```ignore
/// #[derive(Debug)]
/// struct Chat { text: String }
///
/// impl WireCodec for Chat {
///     fn write(&self, buffer: &mut WireBuffer) { buffer.write_string(&self.text) }
///     fn read(buffer: &mut WireBuffer) -> Result<Self, WireError> {
///         Ok(Chat { text: buffer.read_string()? })
///     }
/// }
/// ```
pub trait NetEvent: WireCodec + Send + 'static {
    /// Type name used in logs.
    fn type_name() -> &'static str
    where
        Self: Sized;
}

impl<T> NetEvent for T
where
    T: WireCodec + Send + 'static,
{
    fn type_name() -> &'static str {
        std::any::type_name::<T>()
    }
}
