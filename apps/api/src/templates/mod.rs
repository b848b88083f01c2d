//! Starter documents for the editor, embedded in the binary at build time.

use serde::Serialize;

pub mod handlers;

#[derive(Debug, Serialize)]
pub struct Template {
    pub name: &'static str,
    pub description: &'static str,
    pub content: &'static str,
}

/// Listing entry; omits the document body.
#[derive(Debug, Clone, Serialize)]
pub struct TemplateInfo {
    pub name: &'static str,
    pub description: &'static str,
}

/// Display order matches the editor's template bar. The first entry is the
/// document the editor opens with.
static TEMPLATES: &[Template] = &[
    Template {
        name: "custom_resume",
        description: "Boxed moderncv resume with summary, education, skills, projects and experience",
        content: include_str!("../../templates/custom_resume.tex"),
    },
    Template {
        name: "basic",
        description: "Plain article with title, introduction and conclusion",
        content: include_str!("../../templates/basic.tex"),
    },
    Template {
        name: "report",
        description: "Chaptered report on A4 paper",
        content: include_str!("../../templates/report.tex"),
    },
    Template {
        name: "math",
        description: "amsmath article with inline, display and matrix examples",
        content: include_str!("../../templates/math.tex"),
    },
    Template {
        name: "beamer",
        description: "Beamer slide deck (Madrid theme)",
        content: include_str!("../../templates/beamer.tex"),
    },
    Template {
        name: "cv",
        description: "Minimal moderncv curriculum vitae",
        content: include_str!("../../templates/cv.tex"),
    },
];

pub fn list_templates() -> Vec<TemplateInfo> {
    TEMPLATES
        .iter()
        .map(|t| TemplateInfo {
            name: t.name,
            description: t.description,
        })
        .collect()
}

pub fn get_template(name: &str) -> Option<&'static Template> {
    TEMPLATES.iter().find(|t| t.name == name)
}
