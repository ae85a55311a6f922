use std::path::{Path, PathBuf};

use shared::{
    domain::{Assignment, ItemRole, VideoItem},
    protocol::PageView,
};

pub const ASSET_ROUTE_PREFIX: &str = "/thumbnails";

#[derive(Debug, Clone, Default)]
pub struct ThumbnailResolver {
    dir: Option<PathBuf>,
}

impl ThumbnailResolver {
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// File name of the variant asset for `item`, if its role has one.
    pub fn local_file_name(
        item: &VideoItem,
        role: ItemRole,
        assignment: Option<&Assignment>,
    ) -> Option<String> {
        match (role, assignment) {
            (ItemRole::Control, Some(_)) => Some(format!("{}_control.jpg", item.vid_id)),
            (ItemRole::Treated, Some(assignment)) => Some(format!(
                "{}_image_{}_text_{}.jpg",
                item.vid_id,
                assignment.image_congruency.as_str(),
                assignment.text_congruency.as_str()
            )),
            _ => None,
        }
    }

    pub fn remote_url(vid_id: &str) -> String {
        format!("https://img.youtube.com/vi/{vid_id}/hqdefault.jpg")
    }

    /// Local asset route when the variant file exists, the public thumbnail otherwise.
    pub async fn resolve(
        &self,
        item: &VideoItem,
        role: ItemRole,
        assignment: Option<&Assignment>,
    ) -> String {
        if let (Some(dir), Some(file)) = (self.dir(), Self::local_file_name(item, role, assignment)) {
            if tokio::fs::try_exists(dir.join(&file)).await.unwrap_or(false) {
                return format!("{ASSET_ROUTE_PREFIX}/{file}");
            }
        }
        Self::remote_url(&item.vid_id)
    }

    pub async fn decorate(&self, view: &mut PageView) {
        let assignment = view.assignment.clone();
        for entry in &mut view.items {
            entry.thumbnail_url =
                Some(self.resolve(&entry.item, entry.role, assignment.as_ref()).await);
        }
    }

    /// Path of a served asset, or `None` when the name could escape the directory.
    pub fn asset_path(&self, file: &str) -> Option<PathBuf> {
        let dir = self.dir()?;
        let safe = !file.is_empty()
            && !file.contains(['/', '\\'])
            && file != "."
            && file != ".."
            && !file.starts_with('.');
        safe.then(|| dir.join(file))
    }
}

#[cfg(test)]
#[path = "tests/thumbnails_tests.rs"]
mod tests;
