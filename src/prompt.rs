use crate::models::{ArtStyle, GenerationOptions};

fn style_hint(style: ArtStyle) -> &'static str {
    match style {
        ArtStyle::Photorealistic => "award-winning photograph, 8k, hyperrealistic, sharp focus",
        ArtStyle::Artistic => "impressionist painting, vibrant colors, brushstrokes visible",
        ArtStyle::Fantasy => "epic fantasy digital art, cinematic lighting",
        ArtStyle::Vintage => "vintage photograph, sepia tone, grainy, 1950s",
    }
}

pub fn build_image_prompt(options: &GenerationOptions) -> String {
    format!(
        "A {style} landscape image of: {prompt}. Style details: {hint}. Aspect ratio: {ratio}.",
        style = options.style.as_str(),
        prompt = options.prompt,
        hint = style_hint(options.style),
        ratio = options.aspect_ratio.ratio(),
    )
}

pub fn build_summary_prompt(url: &str, custom_prompt: Option<&str>) -> String {
    let custom = match custom_prompt.map(str::trim) {
        Some(p) if !p.is_empty() => format!("\n\nAdditional instruction: {p}"),
        _ => String::new(),
    };
    format!("Summarize the content found at the URL below, extracting the key information and main points. Use plain prose.\n\nURL: {url}{custom}")
}

pub fn build_keywords_prompt(url: &str) -> String {
    format!("Extract the most relevant keywords from the content at the URL below. Reply with a single line of comma-separated keywords and nothing else.\n\nURL: {url}")
}

/// Splits a comma/newline separated keyword reply, dropping list markers
/// and duplicates while keeping first-seen order.
pub fn parse_keywords(reply: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for raw in reply.split([',', '\n']) {
        let kw = raw.trim().trim_start_matches(['-', '*', '•']).trim().trim_matches('"');
        if kw.is_empty() || out.iter().any(|k| k.eq_ignore_ascii_case(kw)) {
            continue;
        }
        out.push(kw.to_string());
    }
    out
}
