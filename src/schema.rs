use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The nine topic groups the interview must complete before synthesis,
/// in the order they are asked about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    ProjectContext,
    LogicStrategy,
    CinematicPillars,
    Environment,
    Vfx,
    EmotionStory,
    Optics,
    CameraLook,
    Delivery,
}

/// A field the interview asks for, plus the options offered to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub question: &'static str,
    pub options: &'static [&'static str],
}

const PROJECT_CONTEXT: &[FieldSpec] = &[
    FieldSpec {
        name: "project_type",
        question: "What are we creating?",
        options: &["Short film", "Ad", "Brand video", "Music video", "Social/UGC"],
    },
    FieldSpec {
        name: "output_depth",
        question: "What output depth?",
        options: &["Simple", "Detailed", "Storyboard-level"],
    },
];

const LOGIC_STRATEGY: &[FieldSpec] = &[
    FieldSpec {
        name: "shot_count",
        question: "How many shots?",
        options: &["1", "3", "5", "Auto"],
    },
    FieldSpec {
        name: "progression",
        question: "Shot progression?",
        options: &["Establish->Reveal", "Calm->Peak", "Auto"],
    },
];

const CINEMATIC_PILLARS: &[FieldSpec] = &[
    FieldSpec {
        name: "shot_family",
        question: "Preferred shot family?",
        options: &["Wide", "Close-Up", "POV", "Auto"],
    },
    FieldSpec {
        name: "motion",
        question: "Camera motion?",
        options: &["Static", "Dolly", "Handheld"],
    },
    FieldSpec {
        name: "lighting",
        question: "Lighting?",
        options: &["Soft", "Hard", "Neon", "High Key"],
    },
];

const ENVIRONMENT: &[FieldSpec] = &[
    FieldSpec {
        name: "environment",
        question: "Scene location?",
        options: &["Interior", "Studio", "Forest", "Sci-Fi"],
    },
    FieldSpec {
        name: "time_of_day",
        question: "Time of day?",
        options: &["Morning", "Night", "Auto"],
    },
];

const VFX: &[FieldSpec] = &[FieldSpec {
    name: "vfx",
    question: "VFX enhancements?",
    options: &["None", "Subtle Fog/Glow", "Moderate Particles", "Heavy Hologram"],
}];

const EMOTION_STORY: &[FieldSpec] = &[
    FieldSpec {
        name: "emotion",
        question: "Core emotion?",
        options: &["Calm", "Happy", "Tense", "Fear", "Power"],
    },
    FieldSpec {
        name: "intensity",
        question: "Intensity?",
        options: &["Low", "Medium", "High"],
    },
];

const OPTICS: &[FieldSpec] = &[
    FieldSpec {
        name: "lens",
        question: "Lens choice?",
        options: &["50mm", "Wide 24mm", "Macro", "Anamorphic"],
    },
    FieldSpec {
        name: "sensor",
        question: "Sensor size?",
        options: &["Full Frame", "APS-C"],
    },
];

const CAMERA_LOOK: &[FieldSpec] = &[
    FieldSpec {
        name: "camera_brand",
        question: "Camera brand simulation?",
        options: &["ARRI Soft", "RED Punchy", "SONY Clean"],
    },
    FieldSpec {
        name: "film_stock",
        question: "Film stock?",
        options: &["Kodak Vision3", "Vintage", "Fuji"],
    },
];

const DELIVERY: &[FieldSpec] = &[FieldSpec {
    name: "platform",
    question: "Target platform?",
    options: &["YouTube", "Netflix", "Instagram"],
}];

impl Category {
    /// Every category in declaration order. Evaluation always walks this order.
    pub const ALL: [Category; 9] = [
        Category::ProjectContext,
        Category::LogicStrategy,
        Category::CinematicPillars,
        Category::Environment,
        Category::Vfx,
        Category::EmotionStory,
        Category::Optics,
        Category::CameraLook,
        Category::Delivery,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::ProjectContext => "project_context",
            Category::LogicStrategy => "logic_strategy",
            Category::CinematicPillars => "cinematic_pillars",
            Category::Environment => "environment",
            Category::Vfx => "vfx",
            Category::EmotionStory => "emotion_story",
            Category::Optics => "optics",
            Category::CameraLook => "camera_look",
            Category::Delivery => "delivery",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Category::ProjectContext => "Project Context",
            Category::LogicStrategy => "Shot Logic",
            Category::CinematicPillars => "Cinematic Pillars",
            Category::Environment => "Environment",
            Category::Vfx => "VFX",
            Category::EmotionStory => "Emotion & Story",
            Category::Optics => "Optics",
            Category::CameraLook => "Camera Look",
            Category::Delivery => "Delivery",
        }
    }

    pub fn fields(&self) -> &'static [FieldSpec] {
        match self {
            Category::ProjectContext => PROJECT_CONTEXT,
            Category::LogicStrategy => LOGIC_STRATEGY,
            Category::CinematicPillars => CINEMATIC_PILLARS,
            Category::Environment => ENVIRONMENT,
            Category::Vfx => VFX,
            Category::EmotionStory => EMOTION_STORY,
            Category::Optics => OPTICS,
            Category::CameraLook => CAMERA_LOOK,
            Category::Delivery => DELIVERY,
        }
    }

    /// Names of the fields that must all be present for the category to count as complete.
    pub fn required_fields(&self) -> Vec<&'static str> {
        self.fields().iter().map(|f| f.name).collect()
    }
}

/// Free-function form of [`Category::required_fields`].
pub fn required_fields(category: Category) -> Vec<&'static str> {
    category.required_fields()
}

/// Union of every category's required fields, in declaration order.
pub fn all_required_fields() -> Vec<&'static str> {
    Category::ALL
        .iter()
        .flat_map(|c| c.fields().iter().map(|f| f.name))
        .collect()
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown category: {0}")]
pub struct UnknownCategory(pub String);

impl FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s.trim())
            .ok_or_else(|| UnknownCategory(s.to_string()))
    }
}
