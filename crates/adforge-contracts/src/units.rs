use crate::prompts::variation_for;

/// One requested creative variation as it moves through the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationUnit {
    pub index: usize,
    pub credential: Option<String>,
    pub style: &'static str,
    pub composition: &'static str,
    pub prompt: Option<String>,
    pub image: Option<Vec<u8>>,
    pub caption: Option<String>,
    pub failure: Option<String>,
}

impl GenerationUnit {
    pub fn new(index: usize) -> Self {
        let variation = variation_for(index);
        Self {
            index,
            style: variation.style,
            composition: variation.composition,
            ..Self::default()
        }
    }

    /// 1-based file stem shared by the image and caption entries.
    pub fn file_stem(&self) -> String {
        format!("creative_{:02}", self.index + 1)
    }

    pub fn image_file_name(&self) -> String {
        format!("{}.jpg", self.file_stem())
    }

    pub fn caption_file_name(&self) -> String {
        format!("{}.txt", self.file_stem())
    }

    pub fn fail(&mut self, reason: impl Into<String>) {
        self.failure = Some(reason.into());
        self.image = None;
    }
}
