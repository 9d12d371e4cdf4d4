//! System prompts for the four model calls of a turn.

use crate::schema::Category;
use crate::selections::SelectionSet;

fn selections_json(selections: &SelectionSet) -> String {
    serde_json::to_string(selections).unwrap_or_else(|_| "{}".to_string())
}

/// Bulleted `field: question (options)` lines for one category.
pub fn field_guide(category: Category) -> String {
    category
        .fields()
        .iter()
        .map(|f| format!("- {}: {} ({})", f.name, f.question, f.options.join(", ")))
        .collect::<Vec<_>>()
        .join("\n")
}

fn schema_guide() -> String {
    Category::ALL
        .iter()
        .map(|c| {
            let fields: Vec<&str> = c.fields().iter().map(|f| f.name).collect();
            format!("- {} [{}]", c.title(), fields.join(", "))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn analyst_prompt(user_text: &str, selections: &SelectionSet, rules: &str) -> String {
    format!(
        r#"### ROLE: SYSTEM ANALYST
Update the technical brief based on the user's latest message.

USER MESSAGE: "{user_text}"
CURRENT SELECTIONS: {current}
REFERENCE RULES:
{rules}

### TASK:
1. Extract: look for values matching the schema below and put them in `updated_selections`,
   using exactly these field names:
{schema}
2. Auto-Fill: if the user says "Let Jhonny Decide" (or anything meaning "you choose the rest"),
   set `auto_fill` to true. Do not invent values for fields the user did not mention.

Return JSON ONLY:
{{"updated_selections": {{...}}, "auto_fill": false}}"#,
        user_text = user_text,
        current = selections_json(selections),
        rules = if rules.is_empty() { "(none)" } else { rules },
        schema = schema_guide(),
    )
}

pub fn interviewer_prompt(category: Category, caption: &str, selections: &SelectionSet) -> String {
    format!(
        r#"### ROLE: DIRECTOR JHONNY
You are a Senior Creative Producer. Polite, professional, and efficient.

CONTEXT:
- Image: {caption}
- Brief so far: {current}
- CURRENT STEP: {step} ({title})

### TASK:
Ask the user about the missing variables for this step, offering these options:
{guide}

ALWAYS:
- Remind them: "If you're unsure, just say - Let Jhonny Decide."
- Be concise. Combine the questions for this step into one natural message."#,
        caption = caption,
        current = selections_json(selections),
        step = category.as_str(),
        title = category.title(),
        guide = field_guide(category),
    )
}

pub fn orchestrator_prompt(selections: &SelectionSet, caption: &str, master: &str) -> String {
    let get = |field: &str| selections.get(field).unwrap_or("Auto").to_string();
    format!(
        r#"### MASTER ORCHESTRATOR
You are the system working behind the scenes. Apply the logic modules strictly.

USER SELECTIONS: {current}
VISUAL CONTEXT: {caption}
MASTER DATA:
{master}

### EXECUTION PROTOCOL:
1. Shot logic: use '{shot_count}' shots in '{progression}' style.
2. Lens logic: map '{emotion}' to a lens if the lens is Auto; apply lens/lighting rules.
3. Physics: derive depth of field from '{lens}' on '{sensor}'.
4. Color: simulate the '{camera_brand}' look.
5. Delivery: use '{platform}' aspect ratios and codecs.
6. Audio: map the emotion to music.

### OUTPUT:
Return one JSON object (the Sequence) with:
- "cinematic_intent"
- "shots": list of {{framing, motion, lighting, lens, vfx, audio}}
- "technical_metadata": {{sensor, export_settings, color_science}}"#,
        current = selections_json(selections),
        caption = caption,
        master = if master.is_empty() { "(none)" } else { master },
        shot_count = get("shot_count"),
        progression = get("progression"),
        emotion = get("emotion"),
        lens = get("lens"),
        sensor = get("sensor"),
        camera_brand = get("camera_brand"),
        platform = get("platform"),
    )
}

pub fn delivery_prompt(sequence: &serde_json::Value) -> String {
    format!(
        r#"You are Director Jhonny. Produce the FINAL OUTPUT PACKAGE.

SEQUENCE DATA: {sequence}

### REQUIRED OUTPUTS:
1. Text Output: a human-readable cinematic description of the scene flow.
2. JSON Output: the full technical manifest (lens, lights, camera, audio).
3. Multi-Scene Storyboard: Shot 1 -> Shot 2 -> ... with camera/light/lens/VFX details.

Format this using Markdown."#,
        sequence = sequence,
    )
}
