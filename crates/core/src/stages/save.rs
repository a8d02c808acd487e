use std::fs;
use std::path::PathBuf;

use super::{Stage, StageContext, StageOptions};
use crate::Result;
use crate::reservation::SaveTarget;
use crate::unique::is_dir_empty;

const HTML_SUFFIX: &str = ".html";
const FILES_SUFFIX: &str = "_files";

/// Writes `<title>.html` into a folder, with images in `<title>_files/`.
pub struct SaveStage {
    name: String,
    target: SaveTarget,
    options: StageOptions,
}

impl SaveStage {
    /// Creates the output folder if it does not exist.
    pub fn new(name: impl Into<String>, folder: impl Into<PathBuf>, options: StageOptions) -> Result<Self> {
        Ok(Self { name: name.into(), target: SaveTarget::new(folder)?, options })
    }

    pub fn target(&self) -> &SaveTarget {
        &self.target
    }
}

impl Stage for SaveStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, ctx: &StageContext<'_>) -> Result<()> {
        let reservation = self.target.reserve_for(ctx.article, Some(HTML_SUFFIX), Some(FILES_SUFFIX))?;
        let (Some(file), Some(folder)) = (reservation.file(), reservation.folder()) else {
            return Err(std::io::Error::other("incomplete reservation").into());
        };
        let prefix = format!("{}/", reservation.folder_name().unwrap_or_default());

        let mut images = ctx.images.handler(folder, prefix);
        let doc = self.options.compose(ctx, Some(&mut images))?;

        tracing::debug!(path = %file.display(), "Saving");
        fs::write(file, doc.to_html())?;
        if is_dir_empty(folder) {
            fs::remove_dir_all(folder)?;
        }
        reservation.commit();
        Ok(())
    }
}
