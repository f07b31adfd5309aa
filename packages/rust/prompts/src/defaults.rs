//! Built-in stage templates.
//!
//! Each can be replaced through the `[prompts]` section of the config file.

pub const PLAN: &str = r#"Analyze this blog topic and break it down into logical sections.

Topic: {topic}
Target Length: {target_length} words
Style: {style}

Please return your response in this JSON format:

{{
  "topic_analysis": "Your analysis here",
  "target_audience": "Your audience description here",
  "sections": [
    {{
      "section_type": "Introduction",
      "description": "Brief overview of the topic",
      "style_guide": "Keep it engaging and informative",
      "target_length": 200
    }}
  ]
}}

Every section_type must be unique. Replace the example values with actual content.
"#;

pub const GENERATE: &str = r#"Write a blog section based on:
Topic: {topic}
Section Type: {section_type}
Section Goal: {description}
Style Guide: {style_guide}
Target Length: {target_length} words

Previous Sections:
{previous_sections}

Please return your response in this JSON format:

{{
  "content": "Your section content here",
  "key_points": [
    "Main point 1",
    "Main point 2",
    "Main point 3"
  ]
}}

Return valid JSON only. Do not put line breaks inside string values and avoid characters that would break the JSON format.
"#;

pub const REVIEW: &str = r#"Review the blog post and provide feedback.

Topic: {topic}
Target Audience: {audience}

Blog Structure:
{plan}

Written Sections:
{sections}

Please return your response in this JSON format:

{{
  "cohesion_score": 0.85,
  "suggested_edits": [
    {{
      "section_name": "section_name",
      "suggested_edit": "suggested_edit"
    }}
  ],
  "final_version": "Complete, polished blog post"
}}

cohesion_score rates how well the sections flow together, from 0 to 1. Replace the example values with actual content.
"#;
