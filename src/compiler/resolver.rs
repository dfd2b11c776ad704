#[cfg(test)]
use mockall::automock;

use crate::model::Glyph;
use crate::Result;

/// Looks glyphs up in the canvas store
#[cfg_attr(test, automock)]
pub trait GlyphResolver: Send + Sync + 'static {
    fn get_glyph(
        &self,
        id: &str,
    ) -> Result<Option<Glyph>>;
}
