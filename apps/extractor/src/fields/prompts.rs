// Built-in prompt templates used when no field file is supplied.
// `fields.toml` at the crate root carries the same set in editable form.
// Name and Location share one template, so one call answers both.

pub const IDENTITY_PROMPT: &str = "\
Extract the candidate's full name and current location from the resume below. \
The name may appear anywhere in the text and may be written in capitals.

RESUME:
{resume_text}

Respond in exactly this format and nothing else:
- Name: <full name>
- Location: <city, region or country>
Write \"Not mentioned\" for any value the resume does not contain.";

pub const PHONE_PROMPT: &str = "\
Extract the candidate's phone number from the resume below. \
It may be written in international or local format.

RESUME:
{resume_text}

Respond in exactly this format and nothing else:
- Phone Number: <phone number>
Write \"Not mentioned\" if the resume contains no phone number.";

pub const EXPERIENCE_PROMPT: &str = "\
Calculate the candidate's total years of professional work experience from the \
work experience section of the resume below. Internships count; education does not.

RESUME:
{resume_text}

Respond in exactly this format and nothing else:
- Experience: <total years, e.g. 4.5 years>
Write \"Fresher or Not mentioned\" if there is no work experience section.";

pub const FITMENT_PROMPT: &str = "\
Based on the resume and job description below, summarize in about 50 words how \
suitable this candidate is for the role.

RESUME:
{resume_text}

JOB DESCRIPTION:
{job_description}

Respond in exactly this format, on a single line:
- Summary: <50-word summary>";

pub const SCORE_PROMPT: &str = "\
Evaluate how suitable the candidate described in the resume is for the job \
described below, on a scale from 1 (unsuitable) to 100 (ideal).

JOB DESCRIPTION:
{job_description}

RESUME:
{resume_text}

Respond in exactly this format and nothing else:
- Score: <integer from 1 to 100>";

pub const SKILL_FIT_PROMPT: &str = "\
Does the candidate have the skill '{skill}'? If so, describe their experience \
with it in 50 to 100 words, citing the roles or projects where it was used.

RESUME:
{resume_text}

Respond in this format:
- Assessment: <your assessment>
If the resume shows no evidence of the skill, respond with:
- Assessment: Not mentioned";
