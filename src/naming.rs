// ✍️ Naming Requests - Input model, validation and prompt construction
// The prompt is the only contract with the text-generation service:
// everything the model needs (surname, chart, style, constraints) goes in here.

use crate::bazi::BaziResult;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Candidates requested per naming call
pub const CANDIDATE_COUNT: usize = 6;

// ============================================================================
// REQUEST MODEL
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub fn child_label(&self) -> &'static str {
        match self {
            Gender::Male => "男孩",
            Gender::Female => "女孩",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamingStyle {
    #[default]
    SimpleModern,
    ClassicalElegant,
    PoeticClassic,
    SunnyBold,
    GentleSoft,
    UniqueRare,
    // Earlier style set, still accepted from old clients
    Shijing,
    Chuci,
    Modern,
    Zodiac,
}

impl NamingStyle {
    pub fn label(&self) -> &'static str {
        match self {
            NamingStyle::SimpleModern => "简约现代",
            NamingStyle::ClassicalElegant => "古风雅致",
            NamingStyle::PoeticClassic => "诗词典故",
            NamingStyle::SunnyBold => "阳光大气",
            NamingStyle::GentleSoft => "温婉柔美",
            NamingStyle::UniqueRare => "小众独特",
            NamingStyle::Shijing => "诗经",
            NamingStyle::Chuci => "楚辞",
            NamingStyle::Modern => "现代风格",
            NamingStyle::Zodiac => "生肖喜忌",
        }
    }

    /// Style guidance handed to the model
    pub fn guidance(&self) -> &'static str {
        match self {
            NamingStyle::SimpleModern => "简约现代，选字简洁大方、易读易写，符合当代审美",
            NamingStyle::ClassicalElegant => "古风雅致，选字古朴典雅，富有书卷气",
            NamingStyle::PoeticClassic => "诗词典故，名字最好出自经典诗词，并注明出处",
            NamingStyle::SunnyBold => "阳光大气，选字明朗开阔，寓意积极向上",
            NamingStyle::GentleSoft => "温婉柔美，选字柔和温润，读来亲切",
            NamingStyle::UniqueRare => "小众独特，避开常见重名用字，但不用生僻字",
            NamingStyle::Shijing => "诗经，要求选字温婉典雅，富有诗意",
            NamingStyle::Chuci => "楚辞，要求选字浪漫豪放，气势磅礴",
            NamingStyle::Modern => "现代风格，要求选字简洁大方，符合现代审美",
            NamingStyle::Zodiac => "生肖喜忌，要求结合生肖特点选字",
        }
    }

    /// Style tag used by the character library for this naming style
    pub fn library_tag(&self) -> &'static str {
        match self {
            NamingStyle::SimpleModern | NamingStyle::SunnyBold | NamingStyle::Modern => "modern",
            NamingStyle::ClassicalElegant | NamingStyle::Zodiac => "classical",
            NamingStyle::PoeticClassic
            | NamingStyle::GentleSoft
            | NamingStyle::UniqueRare
            | NamingStyle::Shijing
            | NamingStyle::Chuci => "poetic",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NameType {
    Single,
    #[default]
    Double,
}

impl NameType {
    pub fn given_name_len(&self) -> usize {
        match self {
            NameType::Single => 1,
            NameType::Double => 2,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomOptions {
    #[serde(default)]
    pub name_type: NameType,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub disabled_chars: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub preferred_chars: Vec<String>,

    /// Total strokes wished for the given name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke_count: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamingRequest {
    #[serde(alias = "fatherSurname")]
    pub surname: String,

    pub gender: Gender,

    #[serde(default)]
    pub style: NamingStyle,

    /// Gregorian birth date as entered by the user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birthday: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birth_hour: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openid: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_options: Option<CustomOptions>,
}

// ============================================================================
// VALIDATION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("surname is required")]
    MissingSurname,

    #[error("surname may have at most 2 characters, got {0}")]
    SurnameTooLong(usize),

    #[error("birth hour must be between 0 and 23, got {0}")]
    HourOutOfRange(u32),

    #[error("birth hour given without a birthday")]
    HourWithoutBirthday,

    #[error("stroke count must be between 1 and 60, got {0}")]
    StrokeCountOutOfRange(u32),

    #[error("full name must have at least 2 characters")]
    FullNameTooShort,
}

impl NamingRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let surname = self.surname.trim();
        if surname.is_empty() {
            return Err(ValidationError::MissingSurname);
        }
        let len = surname.chars().count();
        if len > 2 {
            return Err(ValidationError::SurnameTooLong(len));
        }

        if let Some(hour) = self.birth_hour {
            if hour > 23 {
                return Err(ValidationError::HourOutOfRange(hour));
            }
            if self.birthday().is_none() {
                return Err(ValidationError::HourWithoutBirthday);
            }
        }

        if let Some(strokes) = self.custom_options.as_ref().and_then(|o| o.stroke_count) {
            if !(1..=60).contains(&strokes) {
                return Err(ValidationError::StrokeCountOutOfRange(strokes));
            }
        }

        Ok(())
    }

    /// Birthday with blank input treated as absent
    pub fn birthday(&self) -> Option<&str> {
        self.birthday
            .as_deref()
            .map(str::trim)
            .filter(|b| !b.is_empty())
    }

    pub fn name_type(&self) -> NameType {
        self.custom_options
            .as_ref()
            .map(|o| o.name_type)
            .unwrap_or_default()
    }
}

pub fn validate_full_name(full_name: &str) -> Result<&str, ValidationError> {
    let name = full_name.trim();
    if name.chars().count() < 2 {
        return Err(ValidationError::FullNameTooShort);
    }
    Ok(name)
}

// ============================================================================
// RESULT MODEL
// ============================================================================

/// One generated name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NameCandidate {
    pub full_name: String,

    #[serde(alias = "char")]
    pub given_name: String,

    #[serde(default)]
    pub pinyin: String,

    #[serde(default)]
    pub wuxing: String,

    #[serde(default)]
    pub meaning: String,

    #[serde(default)]
    pub analysis: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharAnalysis {
    pub char: String,
    pub pinyin: String,
    pub strokes: u32,
    pub wuxing: String,
    pub radical: String,
    pub meaning: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PronunciationAnalysis {
    pub pinyin: String,
    pub tones: String,
    pub harmony: String,
    #[serde(deserialize_with = "score")]
    pub score: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructureAnalysis {
    pub total_strokes: u32,
    pub balance: String,
    #[serde(deserialize_with = "score")]
    pub score: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeaningAnalysis {
    pub overall: String,
    pub cultural: String,
    #[serde(deserialize_with = "score")]
    pub score: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WuxingAnalysis {
    pub elements: Vec<String>,
    pub analysis: String,
    #[serde(deserialize_with = "score")]
    pub score: u8,
}

/// 0-100 score; models sometimes answer 85.5, so round and clamp
fn score<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u8, D::Error> {
    let raw = f64::deserialize(deserializer)?;
    if !raw.is_finite() {
        return Err(serde::de::Error::custom("score must be a finite number"));
    }
    Ok(raw.round().clamp(0.0, 100.0) as u8)
}

/// Full report for an existing name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NameAnalysis {
    pub full_name: String,
    pub chars: Vec<CharAnalysis>,
    pub pronunciation: PronunciationAnalysis,
    pub structure: StructureAnalysis,
    pub meaning: MeaningAnalysis,
    pub wuxing: WuxingAnalysis,
    #[serde(deserialize_with = "score")]
    pub overall_score: u8,
    #[serde(default)]
    pub suggestions: Vec<String>,
}

// ============================================================================
// PROMPTS
// ============================================================================

/// `reference_chars` are library suggestions (usually for the lacking elements)
pub fn build_naming_prompt(
    request: &NamingRequest,
    bazi: Option<&BaziResult>,
    reference_chars: &[String],
) -> String {
    let surname = request.surname.trim();
    let name_type = request.name_type();
    let given_len = name_type.given_name_len();

    let mut info = vec![
        format!("- 姓氏：{}", surname),
        format!("- 性别：{}", request.gender.child_label()),
    ];
    if let (Some(birthday), Some(bazi)) = (request.birthday(), bazi) {
        info.push(format!("- 阳历生日：{}", birthday));
        if bazi.hour_known {
            info.push(format!("- 八字：{}", bazi));
        } else {
            info.push(format!("- 八字（时辰未知）：{} {} {}", bazi.year, bazi.month, bazi.day));
        }
        info.push(format!("- 五行：{}", bazi.profile.summary_label));
        info.push(format!("- 五行解读：{}", bazi.profile.explanation));
    }

    let mut rules = vec![
        format!("- 风格：{}", request.style.guidance()),
        format!("- 数量：精选 {} 个名字", CANDIDATE_COUNT),
        format!("- 名字结构：姓 + {}字名", if given_len == 1 { "单" } else { "双" }),
    ];
    if let Some(options) = &request.custom_options {
        if !options.preferred_chars.is_empty() {
            rules.push(format!("- 优先使用这些字：{}", options.preferred_chars.join("、")));
        }
        if !options.disabled_chars.is_empty() {
            rules.push(format!("- 禁止使用这些字：{}", options.disabled_chars.join("、")));
        }
        if let Some(strokes) = options.stroke_count {
            rules.push(format!("- 名字总笔画尽量接近 {} 画", strokes));
        }
    }
    if !reference_chars.is_empty() {
        rules.push(format!("- 可参考字库用字：{}", reference_chars.join("、")));
    }

    let balance_rule = if bazi.is_some() {
        "补足五行不足或平衡五行"
    } else {
        "五行搭配和谐"
    };

    format!(
        r#"你是一位精通中国传统文化和姓名学的起名专家。

请根据以下信息为宝宝推荐{count}个名字。

**基本信息**
{info}

**选字要求**
{rules}
- 每个名字需要：
  1. {balance_rule}
  2. 与姓氏搭配字音和谐
  3. 寓意美好，符合性别特征
  4. 避免生僻字和谐音不佳的字

**输出格式（严格 JSON）**
{{
  "names": [
    {{
      "fullName": "{surname}某",
      "givenName": "某",
      "pinyin": "完整拼音",
      "wuxing": "名字用字的五行",
      "meaning": "一句话寓意",
      "analysis": "详细分析这个名字的寓意、五行补益、字义解读、文化内涵等（50-80字）"
    }}
  ]
}}

请直接输出 JSON，不要有任何其他文字。"#,
        count = CANDIDATE_COUNT,
        info = info.join("\n"),
        rules = rules.join("\n"),
        balance_rule = balance_rule,
        surname = surname,
    )
}

pub fn build_analysis_prompt(full_name: &str) -> String {
    format!(
        r#"你是一位专业的姓名学分析专家。请对以下名字进行全面分析。

**姓名**: {name}

请从以下几个维度进行分析：

1. **字音分析**：分析每个字的读音、声调搭配是否和谐，整体是否朗朗上口
2. **字形分析**：分析每个字的笔画数、结构，整体是否平衡美观
3. **字义分析**：分析每个字的含义、整体名字的寓意、文化内涵
4. **五行分析**：分析每个字的五行属性，整体五行搭配是否协调

**输出格式（严格 JSON）**
{{
  "fullName": "{name}",
  "chars": [
    {{ "char": "字", "pinyin": "zì", "strokes": 6, "wuxing": "水", "radical": "子", "meaning": "该字的基本含义和在名字中的寓意" }}
  ],
  "pronunciation": {{ "pinyin": "完整拼音", "tones": "声调描述", "harmony": "音韵和谐度评价（50-80字）", "score": 85 }},
  "structure": {{ "totalStrokes": 24, "balance": "结构平衡度评价（50-80字）", "score": 80 }},
  "meaning": {{ "overall": "整体寓意分析（80-120字）", "cultural": "文化内涵分析（80-120字）", "score": 90 }},
  "wuxing": {{ "elements": ["金", "水", "木"], "analysis": "五行搭配分析（50-80字）", "score": 85 }},
  "overallScore": 85,
  "suggestions": ["改进建议1", "改进建议2"]
}}

注意：
- chars 数组包含名字中每个字的详细分析
- 各项 score 为 0-100 的评分
- suggestions 提供 2-3 条具体的改进建议或使用建议
- 请直接输出 JSON，不要有任何其他文字。"#,
        name = full_name
    )
}

// ============================================================================
// TESTS
// ============================================================================
