//! Per-image mutations of the template session.
//!
//! [`compose`] centers a fitted photo in the photo slot, [`recolor`] gives the
//! caption a fresh random color. Both run in the serialized stage only.

use crate::imaging::{FittedAsset, OverlayColor, Placement, center_offset};
use crate::template::{TemplateError, TemplateSession};
use rand::Rng;

/// Place `fitted` centered within the session's photo slot.
pub fn compose(
    session: &mut TemplateSession,
    fitted: FittedAsset,
) -> Result<Placement, TemplateError> {
    let placement = center_offset(session.photo_bounds(), fitted.width, fitted.height);
    session.replace_photo_slot(fitted, placement)?;
    Ok(placement)
}

/// Apply a uniformly random caption color and return it.
///
/// Each channel is drawn independently over `0..=255` from `rng`.
pub fn recolor<R: Rng + ?Sized>(
    session: &mut TemplateSession,
    rng: &mut R,
) -> Result<OverlayColor, TemplateError> {
    let color = OverlayColor::new(rng.random(), rng.random(), rng.random());
    session.set_text_color(color)?;
    Ok(color)
}
