//! Document outline: chapters, sections and the items learners track.

use std::path::Path;

use anyhow::Context;
use serde::Deserialize;
use serde::Serialize;

/// One trackable unit of the outline (definition, theorem, exercise, ...).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OutlineItem {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    #[serde(default)]
    pub page: Option<u32>,
}

impl OutlineItem {
    /// Placeholder metadata for an id the outline does not know.
    pub fn unknown(id: &str) -> Self {
        Self {
            id: id.to_string(),
            kind: "item".to_string(),
            title: id.to_string(),
            page: None,
        }
    }

    fn matches(&self, needle: &str) -> bool {
        self.id.to_lowercase().contains(needle) || self.title.to_lowercase().contains(needle)
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Section {
    pub id: String,
    pub title: String,
    pub page: Option<u32>,
    pub objects: Vec<OutlineItem>,
    pub exercises: Vec<OutlineItem>,
}

impl Section {
    pub fn items(&self) -> impl Iterator<Item = &OutlineItem> {
        self.objects.iter().chain(self.exercises.iter())
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Chapter {
    pub id: String,
    pub title: String,
    pub page: Option<u32>,
    pub sections: Vec<Section>,
}

/// Where an item sits in the outline.
#[derive(Debug, Clone, Copy)]
pub struct Located<'a> {
    pub item: &'a OutlineItem,
    pub section: &'a Section,
    pub chapter: &'a Chapter,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct Outline {
    pub chapters: Vec<Chapter>,
}

#[derive(Deserialize)]
struct RawOutline {
    chapters: Vec<RawChapter>,
}

#[derive(Deserialize)]
struct RawChapter {
    id: String,
    title: String,
    #[serde(default)]
    page: Option<u32>,
    #[serde(default)]
    sections: Vec<RawSection>,
}

#[derive(Deserialize)]
struct RawSection {
    id: String,
    title: String,
    #[serde(default)]
    page: Option<u32>,
    #[serde(default)]
    objects: Vec<OutlineItem>,
    #[serde(default)]
    exercises: Option<RawExercises>,
}

/// Exercises are either listed or generated from a start page and a count.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawExercises {
    Listed(Vec<OutlineItem>),
    Generated { page: u32, count: u32 },
}

impl Outline {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading outline {}", path.display()))?;
        Self::from_json_str(&text).with_context(|| format!("parsing outline {}", path.display()))
    }

    pub fn from_json_str(text: &str) -> anyhow::Result<Self> {
        let raw: RawOutline = serde_json::from_str(text)?;
        let chapters = raw
            .chapters
            .into_iter()
            .map(|c| Chapter {
                id: c.id,
                title: c.title,
                page: c.page,
                sections: c.sections.into_iter().map(build_section).collect(),
            })
            .collect();
        Ok(Self { chapters })
    }

    pub fn items(&self) -> impl Iterator<Item = &OutlineItem> {
        self.chapters
            .iter()
            .flat_map(|c| c.sections.iter())
            .flat_map(Section::items)
    }

    pub fn item_ids(&self) -> impl Iterator<Item = &str> {
        self.items().map(|i| i.id.as_str())
    }

    pub fn find(&self, id: &str) -> Option<Located<'_>> {
        for chapter in &self.chapters {
            for section in &chapter.sections {
                if let Some(item) = section.items().find(|i| i.id == id) {
                    return Some(Located {
                        item,
                        section,
                        chapter,
                    });
                }
            }
        }
        None
    }

    /// Items whose id or title contains `text`, ignoring case. An empty
    /// filter keeps everything.
    pub fn filter(&self, text: &str) -> Vec<&OutlineItem> {
        let needle = text.trim().to_lowercase();
        self.items().filter(|i| i.matches(&needle)).collect()
    }
}

fn build_section(raw: RawSection) -> Section {
    let exercises = match raw.exercises {
        Some(RawExercises::Listed(items)) => items,
        Some(RawExercises::Generated { page, count }) => generate_exercises(&raw.id, page, count),
        None => Vec::new(),
    };
    Section {
        id: raw.id,
        title: raw.title,
        page: raw.page,
        objects: raw.objects,
        exercises,
    }
}

/// `Ex.<section>.<n>` for `n` in `1..=count`, all on `start_page`.
pub fn generate_exercises(section_id: &str, start_page: u32, count: u32) -> Vec<OutlineItem> {
    (1..=count)
        .map(|n| OutlineItem {
            id: format!("Ex.{section_id}.{n}"),
            kind: "exercise".to_string(),
            title: format!("Exercise {n}"),
            page: Some(start_page),
        })
        .collect()
}
