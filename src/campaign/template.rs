//! Prompt template: campaign fields are fixed at construction, row fields are
//! substituted per contact.

use super::model::CampaignParameters;

/// Per-row placeholder tokens, as they appear in the raw template.
pub const PLACEHOLDERS: [&str; 3] = ["{Name}", "{Company}", "{Description}"];

const INTRO: &str = "You are an excellent assistant who writes polished, professional emails. \
     Write a persuasive cold email to {Name}, who works at {Company} on {Description}.";

const INTRO_NO_DESCRIPTION: &str = "You are an excellent assistant who writes polished, \
     professional emails. Write a persuasive cold email to {Name}, who works at {Company}.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Name,
    Company,
    Description,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(String),
    Slot(Slot),
}

/// The row-specific inputs to a prompt.
#[derive(Debug, Clone, Copy)]
pub struct RowFields<'a> {
    pub name: &'a str,
    pub company: &'a str,
    pub description: Option<&'a str>,
}

/// A reusable prompt with campaign fields resolved and row fields left open.
///
/// Same parameters always yield the same template. Substituted values are
/// inserted literally, so a contact named `{Company}` cannot inject a slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    full: Vec<Segment>,
    degraded: Vec<Segment>,
}

impl PromptTemplate {
    pub fn new(params: &CampaignParameters, max_words: usize) -> Self {
        let body = format!(
            "\nThe aim is to ask for {goal} in this field/role: {field}\n\
             My information: {bio}\n\
             STRICTLY FOLLOW the sample format, under {max_words} words:\n\
             <greeting>\n\n\
             <paragraph 1: short and precise one line introduction of me>\n\n\
             <paragraph 2: appreciate their work in one sentence>\n\n\
             <paragraph 3: ask for what I want directly and offer to help them>\n\n\
             Sincerely,\n\
             <my name>",
            goal = params.goal,
            field = params.field,
            bio = params.sender_bio,
        );

        let mut full = parse(INTRO);
        full.push(Segment::Text(body.clone()));
        let mut degraded = parse(INTRO_NO_DESCRIPTION);
        degraded.push(Segment::Text(body));

        Self { full, degraded }
    }

    /// Fill the row slots. A missing or blank description selects the
    /// degraded prompt, which drops the "works on" clause.
    pub fn render(&self, row: RowFields<'_>) -> String {
        let description = row.description.map(str::trim).filter(|d| !d.is_empty());
        let segments = if description.is_some() {
            &self.full
        } else {
            &self.degraded
        };

        let mut out = String::new();
        for segment in segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Slot(Slot::Name) => out.push_str(row.name.trim()),
                Segment::Slot(Slot::Company) => out.push_str(row.company.trim()),
                Segment::Slot(Slot::Description) => out.push_str(description.unwrap_or_default()),
            }
        }
        out
    }

    /// The raw template text with row placeholders still open.
    pub fn raw(&self) -> String {
        self.full
            .iter()
            .map(|segment| match segment {
                Segment::Text(text) => text.as_str(),
                Segment::Slot(Slot::Name) => PLACEHOLDERS[0],
                Segment::Slot(Slot::Company) => PLACEHOLDERS[1],
                Segment::Slot(Slot::Description) => PLACEHOLDERS[2],
            })
            .collect()
    }
}

fn parse(pattern: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut rest = pattern;

    while !rest.is_empty() {
        let next = [
            (PLACEHOLDERS[0], Slot::Name),
            (PLACEHOLDERS[1], Slot::Company),
            (PLACEHOLDERS[2], Slot::Description),
        ]
        .into_iter()
        .filter_map(|(token, slot)| rest.find(token).map(|pos| (pos, token, slot)))
        .min_by_key(|(pos, _, _)| *pos);

        match next {
            Some((pos, token, slot)) => {
                if pos > 0 {
                    segments.push(Segment::Text(rest[..pos].to_string()));
                }
                segments.push(Segment::Slot(slot));
                rest = &rest[pos + token.len()..];
            }
            None => {
                segments.push(Segment::Text(rest.to_string()));
                break;
            }
        }
    }

    segments
}
