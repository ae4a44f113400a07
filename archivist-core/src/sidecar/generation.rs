//! Best-effort parsing of generator parameter text.
//!
//! Image generators embed their settings in several dialects: JSON carrying
//! an `extraMetadata` string, flat JSON with prompt keys, node-graph JSON,
//! and the line-oriented "parameters" text. Each stage only fills what it
//! recognises; nothing here fails.

use archivist_model::LoraRef;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

/// Fields recovered from generation text. Unset fields were not found.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationData {
    pub prompt: Option<String>,
    pub negative_prompt: Option<String>,
    pub model: Option<String>,
    pub sampler: Option<String>,
    pub cfg_scale: Option<f32>,
    pub steps: Option<u32>,
    pub seed: Option<i64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub loras: Option<Vec<LoraRef>>,
}

impl GenerationData {
    pub fn is_empty(&self) -> bool {
        *self == GenerationData::default()
    }
}

static EMBEDDED_OBJECT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)(\{.*\})").expect("embedded object regex should compile"));
static EXTRA_METADATA: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""extraMetadata"\s*:\s*"((?:[^"\\]|\\.)*)""#)
        .expect("extraMetadata regex should compile")
});
static POSITIVE_KEY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""positive"\s*:\s*"((?:[^"\\]|\\.)*)""#).expect("positive regex should compile")
});
static NEGATIVE_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^Negative [Pp]rompt:").expect("negative prompt regex should compile")
});
static NEGATIVE_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^Negative prompt:\s*").expect("negative prefix regex should compile")
});
static STEPS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Steps: (\d+)").expect("steps regex should compile"));
static SAMPLER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Sampler: ([^,]+)").expect("sampler regex should compile"));
static CFG_SCALE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"CFG scale: ([\d.]+)").expect("cfg regex should compile"));
static SEED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Seed: (\d+)").expect("seed regex should compile"));
static MODEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Model: ([^,]+)").expect("model regex should compile"));
static SIZE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Size: (\d+)x(\d+)").expect("size regex should compile"));
static CIVITAI_RESOURCES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Civitai resources:\s*(\[.*?\])").expect("civitai regex should compile")
});
static INLINE_LORA: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<lora:([^:>]+)(?::([^>]+))?>").expect("lora regex should compile")
});
static PROMPT_LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(parameters|UserComment|Comments|prompt):\s*")
        .expect("prompt label regex should compile")
});

/// Parse generation parameters out of free-form text.
pub fn parse_generation_data(text: &str) -> GenerationData {
    let mut data = GenerationData::default();
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return data;
    }

    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        if let Some(json) = parse_json_block(text) {
            if apply_json(&json, &mut data) {
                return data;
            }
        }
    }

    if data.prompt.is_none() {
        if let Some(extra) = EXTRA_METADATA
            .captures(text)
            .and_then(|caps| decode_json_string(&caps[1]))
            .and_then(|raw| serde_json::from_str::<Value>(&raw).ok())
        {
            apply_extra(&extra, &mut data);
        }
    }

    if data.prompt.is_some() {
        return data;
    }

    if trimmed.starts_with('{') {
        if let Some(positive) = POSITIVE_KEY
            .captures(text)
            .and_then(|caps| decode_json_string(&caps[1]))
        {
            data.prompt = Some(positive);
        }
        return data;
    }

    parse_parameter_lines(text, &mut data);
    data
}

fn parse_json_block(text: &str) -> Option<Value> {
    serde_json::from_str(text).ok().or_else(|| {
        EMBEDDED_OBJECT
            .captures(text)
            .and_then(|caps| serde_json::from_str(&caps[1]).ok())
    })
}

fn decode_json_string(escaped: &str) -> Option<String> {
    serde_json::from_str::<String>(&format!("\"{escaped}\"")).ok()
}

/// JavaScript-style truthiness: absent, null, false, 0 and "" are unset.
fn truthy<'a>(object: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    object.get(key).filter(|value| match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    })
}

fn text_of(value: &Value) -> Option<String> {
    value.as_str().map(str::to_string)
}

/// Leading-integer parse that accepts numbers and numeric strings.
fn int_of(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().map(|n| n.trunc() as i64)),
        Value::String(text) => {
            let text = text.trim();
            let end = text
                .char_indices()
                .find(|(idx, c)| !(c.is_ascii_digit() || (*idx == 0 && *c == '-')))
                .map(|(idx, _)| idx)
                .unwrap_or(text.len());
            text[..end].parse().ok()
        }
        _ => None,
    }
}

fn float_of(value: &Value) -> Option<f32> {
    match value {
        Value::Number(number) => number.as_f64().map(|n| n as f32),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn count_of(value: &Value) -> Option<u32> {
    int_of(value).and_then(|n| u32::try_from(n).ok())
}

fn loras_of(value: &Value) -> Option<Vec<LoraRef>> {
    let loras: Vec<LoraRef> = value
        .as_array()?
        .iter()
        .filter_map(|entry| {
            let name = entry
                .get("name")
                .or_else(|| entry.get("modelName"))
                .and_then(Value::as_str)?;
            let weight = entry.get("weight").and_then(float_of).unwrap_or(1.0);
            Some(LoraRef {
                name: name.to_string(),
                weight,
            })
        })
        .collect();
    Some(loras)
}

fn apply_extra(extra: &Value, data: &mut GenerationData) {
    let Some(extra) = extra.as_object() else {
        return;
    };
    if let Some(prompt) = truthy(extra, "prompt").and_then(text_of) {
        data.prompt = Some(prompt);
    }
    if let Some(negative) = truthy(extra, "negativePrompt").and_then(text_of) {
        data.negative_prompt = Some(negative);
    }
    if let Some(steps) = truthy(extra, "steps").and_then(count_of) {
        data.steps = Some(steps);
    }
    if let Some(cfg) = truthy(extra, "cfgScale").and_then(float_of) {
        data.cfg_scale = Some(cfg);
    }
    if let Some(sampler) = truthy(extra, "sampler").and_then(text_of) {
        data.sampler = Some(sampler);
    }
    if let Some(seed) = truthy(extra, "seed").and_then(int_of) {
        data.seed = Some(seed);
    }
    if let Some(loras) = truthy(extra, "loras").and_then(loras_of) {
        data.loras = Some(loras);
    }
}

/// Structured JSON stages. Returns true when parsing is complete.
fn apply_json(json: &Value, data: &mut GenerationData) -> bool {
    let Some(object) = json.as_object() else {
        return false;
    };

    if let Some(extra) = truthy(object, "extraMetadata") {
        let parsed = match extra {
            Value::String(raw) => serde_json::from_str::<Value>(raw).ok(),
            other => Some(other.clone()),
        };
        if let Some(parsed) = parsed {
            apply_extra(&parsed, data);
            if data.prompt.is_some() {
                return true;
            }
        }
    }

    if let Some(prompt) = truthy(object, "prompt").and_then(Value::as_str) {
        let inner = prompt.trim();
        data.prompt = if inner.starts_with('{') || inner.starts_with('[') {
            let nested = serde_json::from_str::<Value>(prompt).ok();
            let nested_text = nested.as_ref().and_then(Value::as_object).and_then(|nested| {
                ["prompt", "text", "positive"]
                    .iter()
                    .find_map(|key| truthy(nested, key).and_then(text_of))
            });
            Some(nested_text.unwrap_or_else(|| prompt.to_string()))
        } else {
            Some(prompt.to_string())
        };
    }

    for key in ["positive", "positive_prompt"] {
        if let Some(prompt) = truthy(object, key).and_then(text_of) {
            data.prompt = Some(prompt);
        }
    }
    for key in ["negative", "negative_prompt"] {
        if let Some(negative) = truthy(object, key).and_then(text_of) {
            data.negative_prompt = Some(negative);
        }
    }

    for node in object.values().filter_map(Value::as_object) {
        let Some(class_type) = node.get("class_type").and_then(Value::as_str) else {
            continue;
        };
        let empty = Map::new();
        let inputs = node.get("inputs").and_then(Value::as_object).unwrap_or(&empty);

        if class_type.contains("CLIPTextEncode") || class_type == "Prompts" {
            apply_text_node(node, inputs, data);
        }
        if class_type.contains("KSampler") {
            if let Some(steps) = truthy(inputs, "steps").and_then(count_of) {
                data.steps = Some(steps);
            }
            if let Some(cfg) = truthy(inputs, "cfg").and_then(float_of) {
                data.cfg_scale = Some(cfg);
            }
            if let Some(sampler) = truthy(inputs, "sampler_name").and_then(text_of) {
                data.sampler = Some(sampler);
            }
            if let Some(seed) = truthy(inputs, "seed").and_then(int_of) {
                data.seed = Some(seed);
            }
        }
    }

    if let Some(steps) = truthy(object, "steps").and_then(count_of) {
        data.steps = Some(steps);
    }
    if let Some(seed) = truthy(object, "seed").and_then(int_of) {
        data.seed = Some(seed);
    }
    if let Some(cfg) = truthy(object, "cfg").and_then(float_of) {
        data.cfg_scale = Some(cfg);
    }
    if let Some(sampler) = truthy(object, "sampler_name").and_then(text_of) {
        data.sampler = Some(sampler);
    }
    if let Some(model) = truthy(object, "checkpoint").and_then(text_of) {
        data.model = Some(model);
    }
    false
}

fn apply_text_node(node: &Map<String, Value>, inputs: &Map<String, Value>, data: &mut GenerationData) {
    let Some(text) = ["text", "string", "prompt"]
        .iter()
        .find_map(|key| truthy(inputs, key).and_then(Value::as_str))
    else {
        return;
    };
    let title = node
        .get("_meta")
        .and_then(|meta| meta.get("title"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_lowercase();

    if title == "positive" || (title.contains("prompt") && !title.contains("neg")) {
        if data.prompt.is_none() || title == "positive" {
            data.prompt = Some(text.to_string());
        }
    } else if title.contains("neg") {
        data.negative_prompt = Some(text.to_string());
    } else if data.prompt.is_none() {
        data.prompt = Some(text.to_string());
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum LineState {
    Prompt,
    Negative,
    Params,
}

fn is_parameter_line(line: &str) -> bool {
    line.starts_with("Steps:")
        && (line.contains("Sampler:") || line.contains("Model:") || line.contains("CFG scale:"))
}

fn parse_parameter_lines(text: &str, data: &mut GenerationData) {
    let mut buffer: Vec<&str> = Vec::new();
    let mut state = LineState::Prompt;
    let mut resource_loras: Vec<LoraRef> = Vec::new();

    for line in text.lines() {
        let trimmed = line.trim();

        if trimmed.is_empty() && buffer.is_empty() && state == LineState::Prompt {
            continue;
        }

        if state != LineState::Params && is_parameter_line(trimmed) {
            let collected = buffer.join("\n").trim().to_string();
            match state {
                LineState::Prompt => data.prompt = Some(collected),
                LineState::Negative => data.negative_prompt = Some(collected),
                LineState::Params => {}
            }
            state = LineState::Params;
            buffer.clear();
            parse_parameter_line(trimmed, data, &mut resource_loras);
            continue;
        }

        if state == LineState::Prompt && NEGATIVE_LINE.is_match(trimmed) {
            data.prompt = Some(buffer.join("\n").trim().to_string());
            state = LineState::Negative;
            buffer.clear();
            let content = NEGATIVE_PREFIX.replace(trimmed, "");
            if !content.is_empty() {
                buffer.push(trimmed.get(trimmed.len() - content.len()..).unwrap_or_default());
            }
            continue;
        }

        buffer.push(line);
    }

    match state {
        LineState::Prompt if !buffer.is_empty() => {
            data.prompt = Some(buffer.join("\n").trim().to_string());
        }
        LineState::Negative if !buffer.is_empty() => {
            data.negative_prompt = Some(buffer.join("\n").trim().to_string());
        }
        _ => {}
    }

    if let Some(prompt) = data.prompt.take() {
        let mut loras: Vec<LoraRef> = INLINE_LORA
            .captures_iter(&prompt)
            .map(|caps| LoraRef {
                name: caps[1].to_string(),
                weight: caps
                    .get(2)
                    .and_then(|weight| weight.as_str().trim().parse().ok())
                    .unwrap_or(1.0),
            })
            .collect();
        loras.append(&mut resource_loras);
        if !loras.is_empty() {
            data.loras.get_or_insert_with(Vec::new).extend(loras);
        }
        data.prompt = Some(PROMPT_LABEL.replace(&prompt, "").into_owned());
    } else if !resource_loras.is_empty() {
        data.loras.get_or_insert_with(Vec::new).extend(resource_loras);
    }
}

fn parse_parameter_line(line: &str, data: &mut GenerationData, loras: &mut Vec<LoraRef>) {
    data.steps = Some(
        STEPS
            .captures(line)
            .and_then(|caps| caps[1].parse().ok())
            .unwrap_or(20),
    );
    data.sampler = SAMPLER.captures(line).map(|caps| caps[1].trim().to_string());
    data.cfg_scale = Some(
        CFG_SCALE
            .captures(line)
            .and_then(|caps| caps[1].parse().ok())
            .unwrap_or(7.0),
    );
    data.seed = Some(
        SEED.captures(line)
            .and_then(|caps| caps[1].parse().ok())
            .unwrap_or(0),
    );
    data.model = MODEL.captures(line).map(|caps| caps[1].trim().to_string());

    if let Some(resources) = CIVITAI_RESOURCES
        .captures(line)
        .and_then(|caps| serde_json::from_str::<Vec<Value>>(&caps[1]).ok())
    {
        let of_type = |kind: &'static str| {
            resources
                .iter()
                .filter(move |resource| resource.get("type").and_then(Value::as_str) == Some(kind))
        };
        if data.model.is_none() {
            data.model = of_type("checkpoint")
                .find_map(|resource| resource.get("modelName").and_then(Value::as_str))
                .map(str::to_string);
        }
        loras.extend(of_type("lora").filter_map(|resource| {
            let name = resource.get("modelName").and_then(Value::as_str)?;
            let weight = resource
                .get("weight")
                .and_then(float_of)
                .filter(|weight| *weight != 0.0)
                .unwrap_or(1.0);
            Some(LoraRef {
                name: name.to_string(),
                weight,
            })
        }));
    }

    if let Some(size) = SIZE.captures(line) {
        data.width = size[1].parse().ok();
        data.height = size[2].parse().ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_parameter_text_dialect() {
        let text = "masterpiece, a red fox <lora:foxstyle:0.8>\n\
                    in the snow\n\
                    Negative prompt: blurry, lowres\n\
                    Steps: 30, Sampler: DPM++ 2M Karras, CFG scale: 6.5, Seed: 1234, Size: 512x768, Model: dreamshaper_8";
        let data = parse_generation_data(text);

        assert_eq!(
            data.prompt.as_deref(),
            Some("masterpiece, a red fox <lora:foxstyle:0.8>\nin the snow")
        );
        assert_eq!(data.negative_prompt.as_deref(), Some("blurry, lowres"));
        assert_eq!(data.steps, Some(30));
        assert_eq!(data.sampler.as_deref(), Some("DPM++ 2M Karras"));
        assert_eq!(data.cfg_scale, Some(6.5));
        assert_eq!(data.seed, Some(1234));
        assert_eq!(data.width, Some(512));
        assert_eq!(data.height, Some(768));
        assert_eq!(data.model.as_deref(), Some("dreamshaper_8"));
        assert_eq!(
            data.loras,
            Some(vec![LoraRef {
                name: "foxstyle".into(),
                weight: 0.8
            }])
        );
    }

    #[test]
    fn civitai_resources_supply_model_and_loras() {
        let text = "a castle\nSteps: 25, Sampler: Euler a, CFG scale: 7, Seed: 9, \
                    Civitai resources: [{\"type\":\"checkpoint\",\"modelName\":\"Juggernaut\"},\
                    {\"type\":\"lora\",\"modelName\":\"Detail\",\"weight\":0.6}], Version: v1";
        let data = parse_generation_data(text);

        assert_eq!(data.model.as_deref(), Some("Juggernaut"));
        assert_eq!(
            data.loras,
            Some(vec![LoraRef {
                name: "Detail".into(),
                weight: 0.6
            }])
        );
    }

    #[test]
    fn extra_metadata_json_wins() {
        let text = r#"{"extraMetadata":"{\"prompt\":\"a cat\",\"negativePrompt\":\"dog\",\"steps\":28,\"cfgScale\":5,\"sampler\":\"Euler\",\"seed\":\"77\"}","prompt":"ignored"}"#;
        let data = parse_generation_data(text);

        assert_eq!(data.prompt.as_deref(), Some("a cat"));
        assert_eq!(data.negative_prompt.as_deref(), Some("dog"));
        assert_eq!(data.steps, Some(28));
        assert_eq!(data.cfg_scale, Some(5.0));
        assert_eq!(data.sampler.as_deref(), Some("Euler"));
        assert_eq!(data.seed, Some(77));
    }

    #[test]
    fn direct_prompt_keys() {
        let data = parse_generation_data(r#"{"positive":"sunset","negative_prompt":"people","steps":"12"}"#);
        assert_eq!(data.prompt.as_deref(), Some("sunset"));
        assert_eq!(data.negative_prompt.as_deref(), Some("people"));
        assert_eq!(data.steps, Some(12));
    }

    #[test]
    fn node_graph_uses_titles_for_polarity() {
        let text = r#"{
            "3": {"class_type": "KSampler", "inputs": {"steps": 40, "cfg": 4.5, "sampler_name": "dpmpp_2m", "seed": 42}},
            "6": {"class_type": "CLIPTextEncode", "_meta": {"title": "Negative"}, "inputs": {"text": "ugly"}},
            "7": {"class_type": "CLIPTextEncode", "_meta": {"title": "Positive Prompt"}, "inputs": {"text": "a lighthouse"}}
        }"#;
        let data = parse_generation_data(text);

        assert_eq!(data.prompt.as_deref(), Some("a lighthouse"));
        assert_eq!(data.negative_prompt.as_deref(), Some("ugly"));
        assert_eq!(data.steps, Some(40));
        assert_eq!(data.cfg_scale, Some(4.5));
        assert_eq!(data.sampler.as_deref(), Some("dpmpp_2m"));
        assert_eq!(data.seed, Some(42));
    }

    #[test]
    fn plain_prompt_without_parameters() {
        let data = parse_generation_data("parameters: just a prompt");
        assert_eq!(data.prompt.as_deref(), Some("just a prompt"));
        assert!(data.steps.is_none());
    }

    #[test]
    fn garbage_never_panics() {
        assert!(parse_generation_data("").is_empty());
        let data = parse_generation_data("{ not json at all");
        assert!(data.prompt.is_none());
    }
}
