//! Integration test crate for Mixdown.
//!
//! Cross-crate scenarios rendered through an offline sink, so no audio or
//! MIDI hardware is needed.

#[cfg(test)]
mod support;

#[cfg(test)]
mod playback;

#[cfg(test)]
mod editing;

#[cfg(test)]
mod routing;
