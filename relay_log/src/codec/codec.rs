/// A named, swappable wire encoding.
pub trait Codec {
    fn new() -> Self
    where
        Self: Sized;

    fn name(&self) -> String;
}
