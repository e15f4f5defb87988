//! Prompt texts sent to the model.
//!
//! Templates use `{name}` placeholders filled by [`fill_template`]. Unknown
//! placeholders are left untouched so that literal braces (code samples,
//! JSON) survive.

/// Shared template for every catalog stage.
pub const SECTION_TEMPLATE: &str = r#"You are an expert in creating detailed and user-friendly electronics project tutorials. Generate the content for the following section of a project tutorial.

**Project Name:** {project}
**Section Title:** {section}

**Context from Previous Sections:**
{memory}

**Content Requirements:**
- Use clear and concise language that guides the user through each step.
- Begin with a relevant and engaging header for the section title.
- Use lists, bullet points or numbered steps where they help readability.
- For code, provide complete, working and well-commented examples inside triple backticks. Never truncate code; split long programs into runnable segments instead.
- For wiring, give step-by-step written instructions naming every connection. Do not rely on diagrams.
- Format the answer as Markdown.
- Refer back to earlier sections where it helps continuity.
- Stay under 1000 words.

**Goal:** actionable, easy-to-follow instructions that let the reader finish this part of the project with confidence.
"#;

/// Prompt for the overview stage; only the raw project name is available.
pub const OVERVIEW_TEMPLATE: &str = r#"You are an expert in electronics helping a beginner understand how to build a project.
Provide a project title and a brief overview of how to implement this electronic project: {project}

Include:
1. A list of the main components needed
2. The basic steps to connect the components
3. A short description of how the project works

Format the answer as Markdown and keep it under 300 words.
"#;

/// Prompt used to condense a finished section into session memory.
pub const SUMMARY_TEMPLATE: &str = r#"Provide a concise summary of the following content for the section "{section}" of the project "{project}".
The summary must be 2-3 sentences long and capture the key points only.

{content}
"#;

/// Prompt for the photo analysis that suggests projects.
pub const IDEAS_TEMPLATE: &str = r#"Analyze this image of electronic parts and provide the following:
1. A list of all identifiable electronic components in the image.
2. Four unique and creative project ideas that can be built with these components. Make each title detailed and imaginative.

Previous project titles (do not repeat these or suggest very similar ideas):
{previous}

Format your response exactly as follows:
Components:
- [component]

Project Ideas:
1. [Project 1 Title]: [Brief description]
2. [Project 2 Title]: [Brief description]
3. [Project 3 Title]: [Brief description]
4. [Project 4 Title]: [Brief description]
"#;

/// Shown in place of session memory before any stage has completed.
pub const NO_HISTORY: &str = "No previous sections yet.";

/// Substitute `{name}` placeholders in a single pass.
///
/// Values are inserted verbatim and never re-scanned, so a project name that
/// itself contains `{section}` stays as typed.
pub fn fill_template(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let replaced = after.find('}').and_then(|close| {
            let name = &after[..close];
            values
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (*value, close))
        });
        match replaced {
            Some((value, close)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// True if `template` contains `{name}`.
pub fn has_placeholder(template: &str, name: &str) -> bool {
    template.contains(&format!("{{{}}}", name))
}

pub fn overview_prompt(project: &str) -> String {
    fill_template(OVERVIEW_TEMPLATE, &[("project", project)])
}

pub fn summary_prompt(project: &str, section: &str, content: &str) -> String {
    fill_template(
        SUMMARY_TEMPLATE,
        &[("project", project), ("section", section), ("content", content)],
    )
}

pub fn ideas_prompt(previous: &[String]) -> String {
    let previous = if previous.is_empty() {
        "No previous projects.".to_string()
    } else {
        previous
            .iter()
            .map(|title| format!("- {}", title))
            .collect::<Vec<_>>()
            .join("\n")
    };
    fill_template(IDEAS_TEMPLATE, &[("previous", &previous)])
}
