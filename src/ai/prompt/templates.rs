//! Prompt templates per extraction kind.
//!
//! Placeholders are `{name}` tokens filled by fixed substitution:
//! `{text}` is always the (truncated) document, `{subject}` and `{visits}` are
//! optional request parameters.

pub(super) const SYSTEM: &str = "You are a clinical research data specialist. \
You extract structured data from clinical trial documents exactly as written. \
Never invent values that are not present in the text. \
Respond with a single JSON object and nothing else.";

pub(super) const CRITERIA: &str = r#"Extract every inclusion and exclusion criterion from the protocol text below.

Rules:
- Keep the original numbering when present.
- Keep each criterion's full wording; do not summarize.
- Sub-items belong to their parent criterion.

Return JSON in exactly this shape:
{"inclusion_criteria": [{"number": "1", "text": "..."}], "exclusion_criteria": [{"number": "1", "text": "..."}]}

Protocol text:
{text}"#;

pub(super) const VISIT_SCHEDULE: &str = r#"Extract the schedule of visits (schedule of assessments) from the protocol text below.

Rules:
- One entry per visit, in chronological order.
- "day" is the nominal study day (e.g. "-28", "1", "29"); "window" is the allowed deviation (e.g. "±3 days").
- List procedures (sampling, dosing, imaging) and assessments (scales, questionnaires, vital signs) performed at that visit.

Return JSON in exactly this shape:
{"visits": [{"name": "Screening", "day": "-28", "window": "", "procedures": ["..."], "assessments": ["..."]}]}

Protocol text:
{text}"#;

pub(super) const MEDICATIONS: &str = r#"Extract all concomitant and prior medications recorded for subject {subject} from the medical record text below.

Rules:
- Dates as written in the source; prefer YYYY-MM-DD when the source is unambiguous.
- "ongoing" is true when no end date is given and the record indicates continued use.
- Use null for fields that are not stated.

Return JSON in exactly this shape:
{"medications": [{"name": "...", "dose": "...", "unit": "...", "route": "...", "frequency": "...", "start_date": "...", "end_date": null, "indication": "...", "ongoing": true}]}

Medical record text:
{text}"#;

pub(super) const SUBJECT_NUMBER: &str = r#"Find the subject (participant) identification number in the medical record text below.

Rules:
- Return the identifier exactly as written, including prefixes and separators.
- Return null if no subject number is present.

Return JSON in exactly this shape:
{"subject_number": "..."}

Medical record text:
{text}"#;

pub(super) const SUBJECT_VISIT_DATES: &str = r#"Find the date of each study visit for subject {subject} in the medical record text below.

Expected visits: {visits}

Rules:
- One entry per visit that has a recorded date.
- Dates in YYYY-MM-DD format when unambiguous, otherwise as written.

Return JSON in exactly this shape:
{"visit_dates": [{"visit_name": "...", "date": "..."}]}

Medical record text:
{text}"#;

pub(super) const SUBJECT_VISIT_ITEMS: &str = r#"For subject {subject}, determine which scheduled items were performed at each visit according to the medical record text below.

Expected visits: {visits}

Rules:
- One entry per visit and item.
- "performed" is true only when the record shows the item was done.
- "result" holds the recorded value or finding, or null.

Return JSON in exactly this shape:
{"visit_items": [{"visit_name": "...", "item": "...", "performed": true, "date": "...", "result": null}]}

Medical record text:
{text}"#;
