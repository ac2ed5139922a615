//! Export generators: CSV, JSON, social captions and the embeddable widget.
//!
//! Everything here is pure string building. Testimonial text comes from
//! anonymous submitters, so every interpolation into HTML or script goes through
//! [`escape_html`] or [`js_string`].

use super::branding::WidgetTheme;
use super::testimonial::{ExportTestimonial, TestimonialStatus};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use strum::{Display, EnumString};

pub const CSV_HEADERS: [&str; 9] = [
    "Name",
    "Email",
    "Company",
    "Rating",
    "Testimonial",
    "Status",
    "Submitted Date",
    "Form",
    "Custom Fields",
];

pub const SOCIAL_MAX_CHARS: usize = 200;
pub const WIDGET_MAX_CARDS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ExportFormat {
    Csv,
    Json,
    Widget,
    Social,
}

impl ExportFormat {
    /// JSON and the widget are premium exports.
    pub fn is_advanced(&self) -> bool {
        matches!(self, ExportFormat::Json | ExportFormat::Widget)
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "text/csv; charset=utf-8",
            ExportFormat::Json => "application/json; charset=utf-8",
            ExportFormat::Widget => "text/html; charset=utf-8",
            ExportFormat::Social => "text/plain; charset=utf-8",
        }
    }

    pub fn file_extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
            ExportFormat::Widget => "html",
            ExportFormat::Social => "txt",
        }
    }
}

/// Separator between posts in a social export.
pub const SOCIAL_POST_SEPARATOR: &str = "\n\n---\n\n";

fn csv_field(value: &str) -> String {
    if value.contains(&[',', '"', '\n', '\r'][..]) {
        csv_quoted(value)
    } else {
        value.to_string()
    }
}

fn csv_quoted(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

/// Header row plus one row per testimonial, `\n` separated.
///
/// The testimonial message is always quoted. Custom fields collapse into one
/// `key: value; key: value` cell.
pub fn to_csv(testimonials: &[ExportTestimonial]) -> String {
    let mut out = CSV_HEADERS.join(",");
    for t in testimonials {
        let custom = t
            .custom_responses
            .iter()
            .map(|(k, v)| format!("{k}: {v}"))
            .collect::<Vec<_>>()
            .join("; ");
        let row = [
            csv_field(&t.name),
            csv_field(&t.email),
            csv_field(t.company.as_deref().unwrap_or("")),
            t.rating.to_string(),
            csv_quoted(&t.message),
            t.status.to_string(),
            t.submitted_at.format("%Y-%m-%d").to_string(),
            csv_field(&t.form_title),
            if custom.is_empty() {
                String::new()
            } else {
                csv_quoted(&custom)
            },
        ];
        out.push('\n');
        out.push_str(&row.join(","));
    }
    out
}

pub fn to_json(testimonials: &[ExportTestimonial]) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(testimonials)
}

fn stars(rating: i16) -> usize {
    rating.clamp(0, 5) as usize
}

pub fn social_post(testimonial: &ExportTestimonial) -> String {
    let message = if testimonial.message.chars().count() > SOCIAL_MAX_CHARS {
        let cut: String = testimonial.message.chars().take(SOCIAL_MAX_CHARS).collect();
        format!("{cut}...")
    } else {
        testimonial.message.clone()
    };
    let attribution = match testimonial.company.as_deref() {
        Some(company) if !company.is_empty() => format!("{}, {}", testimonial.name, company),
        _ => testimonial.name.clone(),
    };
    format!(
        "{} Customer Love!\n\n\"{}\"\n\n- {}\n\n#CustomerSuccess #Testimonial",
        "⭐".repeat(stars(testimonial.rating)),
        message,
        attribution
    )
}

pub fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Single-quoted JavaScript string literal.
///
/// Quotes, backslashes, markup characters and line terminators are emitted as
/// `\uXXXX`, so the literal is safe inside `<script>` and, after
/// [`escape_html`], inside an attribute.
pub fn js_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for c in value.chars() {
        match c {
            '\\' | '\'' | '"' | '<' | '>' | '&' | '`' | '\u{2028}' | '\u{2029}' => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c if (c as u32) < 0x20 => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            _ => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// Only `http(s)` and inline image/video data URLs may appear as media sources.
fn safe_media_url(url: &str) -> Option<&str> {
    let lower = url.trim_start().to_ascii_lowercase();
    if lower.starts_with("https://")
        || lower.starts_with("http://")
        || lower.starts_with("data:image/")
        || lower.starts_with("data:video/")
    {
        Some(url)
    } else {
        None
    }
}

fn modal_call(t: &ExportTestimonial, media_url: &str, is_video: bool) -> String {
    let call = format!(
        "openTestimonialModal({}, {}, {}, {}, {}, {})",
        js_string(&t.id.to_string()),
        js_string(media_url),
        js_string(&t.name),
        js_string(&t.message),
        stars(t.rating),
        is_video
    );
    escape_html(&call)
}

fn widget_card(out: &mut String, t: &ExportTestimonial, theme: &WidgetTheme) {
    let rating = stars(t.rating);
    let font = &theme.font_family;
    let _ = write!(
        out,
        r#"
    <div class="testimonial-card" style="background: #f9f9f9; padding: 20px; border-radius: 12px; border-left: 4px solid {secondary}; box-shadow: 0 2px 4px rgba(0,0,0,0.1); position: relative; font-family: '{font}', system-ui, sans-serif;">
      <div style="display: flex; margin-bottom: 8px;">
        {filled}<span style="color: #ddd;">{empty}</span>
      </div>"#,
        secondary = theme.secondary_color,
        filled = "★".repeat(rating),
        empty = "★".repeat(5 - rating),
    );

    if let Some(image) = t.image_url.as_deref().and_then(safe_media_url) {
        let _ = write!(
            out,
            r#"
      <div style="margin-bottom: 12px;">
        <img src="{src}" alt="Customer photo" style="width: 60px; height: 60px; border-radius: 50%; object-fit: cover; border: 2px solid {secondary}; cursor: pointer;" onclick="{onclick}">
      </div>"#,
            src = escape_html(image),
            secondary = theme.secondary_color,
            onclick = modal_call(t, image, false),
        );
    }

    if let Some(video) = t.video_url.as_deref().and_then(safe_media_url) {
        let _ = write!(
            out,
            r#"
      <div style="margin-bottom: 12px; position: relative; cursor: pointer;" onclick="{onclick}">
        <div style="width: 100%; height: 120px; background: linear-gradient(135deg, {primary}, {secondary}); border-radius: 8px; display: flex; align-items: center; justify-content: center; position: relative;">
          <div style="background: rgba(255,255,255,0.9); border-radius: 50%; width: 40px; height: 40px; display: flex; align-items: center; justify-content: center;">
            <span style="color: {primary}; font-size: 16px;">▶</span>
          </div>
          <div style="position: absolute; bottom: 8px; left: 8px; background: rgba(0,0,0,0.7); color: white; padding: 2px 6px; border-radius: 4px; font-size: 10px;">
            Video Testimonial
          </div>
        </div>
      </div>"#,
            onclick = modal_call(t, video, true),
            primary = theme.primary_color,
            secondary = theme.secondary_color,
        );
    }

    let company = match t.company.as_deref() {
        Some(c) if !c.is_empty() => format!(", {}", escape_html(c)),
        _ => String::new(),
    };
    let _ = write!(
        out,
        r#"
      <p style="margin: 0 0 15px 0; font-style: italic; color: #555; line-height: 1.5;">"{message}"</p>
      <div style="font-size: 14px; color: #777; font-family: '{font}', system-ui, sans-serif;">
        - {name}{company}
      </div>
    </div>"#,
        message = escape_html(&t.message),
        name = escape_html(&t.name),
    );
}

/// Self-contained HTML fragment showing up to three approved testimonials.
///
/// Non-approved testimonials are skipped. The theme is sanitized first; the modal
/// script builds its content with DOM nodes and `textContent`, never `innerHTML`.
pub fn widget(testimonials: &[ExportTestimonial], theme: &WidgetTheme) -> String {
    let theme = theme.sanitized();
    let font = &theme.font_family;

    let mut cards = String::new();
    for t in testimonials
        .iter()
        .filter(|t| t.status == TestimonialStatus::Approved)
        .take(WIDGET_MAX_CARDS)
    {
        widget_card(&mut cards, t, &theme);
    }

    format!(
        r#"<!-- TestiFlow Testimonials Widget -->
<div class="testimonials-widget" style="max-width: 1000px; margin: 0 auto; padding: 20px; font-family: '{font}', system-ui, sans-serif;">
  <h3 style="text-align: center; margin-bottom: 20px; color: #333; font-family: '{font}', system-ui, sans-serif;">What Our Customers Say</h3>
  <div style="display: grid; grid-template-columns: repeat(auto-fit, minmax(300px, 1fr)); gap: 20px;">{cards}
  </div>
</div>

<div id="testimonial-modal" style="display: none; position: fixed; top: 0; left: 0; width: 100%; height: 100%; background: rgba(0,0,0,0.8); z-index: 1000; align-items: center; justify-content: center; font-family: '{font}', system-ui, sans-serif;">
  <div style="background: white; border-radius: 12px; max-width: 600px; width: 90%; max-height: 80%; overflow: hidden; position: relative;">
    <button onclick="closeTestimonialModal()" style="position: absolute; top: 10px; right: 10px; background: rgba(0,0,0,0.5); color: white; border: none; border-radius: 50%; width: 30px; height: 30px; cursor: pointer; z-index: 1001;">×</button>
    <div id="modal-content" style="padding: 20px; text-align: center;"></div>
  </div>
</div>

<script>
function openTestimonialModal(id, mediaUrl, name, message, rating, isVideo) {{
  var modal = document.getElementById('testimonial-modal');
  var content = document.getElementById('modal-content');
  while (content.firstChild) {{ content.removeChild(content.firstChild); }}

  var media;
  if (isVideo) {{
    media = document.createElement('video');
    media.controls = true;
    media.style.cssText = 'width: 100%; max-height: 300px; border-radius: 8px; margin-bottom: 20px;';
    var source = document.createElement('source');
    source.src = mediaUrl;
    source.type = 'video/mp4';
    media.appendChild(source);
  }} else {{
    media = document.createElement('img');
    media.src = mediaUrl;
    media.alt = 'Customer photo';
    media.style.cssText = 'width: 150px; height: 150px; border-radius: 50%; object-fit: cover; margin: 0 auto 20px; border: 3px solid {secondary};';
  }}
  content.appendChild(media);

  var stars = document.createElement('div');
  stars.style.marginBottom = '12px';
  stars.appendChild(document.createTextNode('★'.repeat(rating)));
  var grey = document.createElement('span');
  grey.style.color = '#ddd';
  grey.textContent = '★'.repeat(5 - rating);
  stars.appendChild(grey);
  content.appendChild(stars);

  var text = document.createElement('p');
  text.style.cssText = "font-style: italic; color: #555; line-height: 1.6; margin-bottom: 16px; font-family: '{font}', system-ui, sans-serif;";
  text.textContent = '"' + message + '"';
  content.appendChild(text);

  var author = document.createElement('div');
  author.style.cssText = 'font-weight: 600; color: {primary};';
  author.textContent = '- ' + name;
  content.appendChild(author);

  modal.style.display = 'flex';
}}

function closeTestimonialModal() {{
  document.getElementById('testimonial-modal').style.display = 'none';
}}

document.getElementById('testimonial-modal').addEventListener('click', function (e) {{
  if (e.target === this) {{
    closeTestimonialModal();
  }}
}});
</script>"#,
        primary = theme.primary_color,
        secondary = theme.secondary_color,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeMap;
    use uuid::Uuid;

    fn sample(status: TestimonialStatus, message: &str) -> ExportTestimonial {
        ExportTestimonial {
            id: Uuid::new_v4(),
            name: "Ada Lovelace".into(),
            email: "ada@example.com".into(),
            company: Some("Analytical Engines".into()),
            message: message.into(),
            rating: 5,
            status,
            submitted_at: Utc.with_ymd_and_hms(2025, 3, 14, 9, 30, 0).unwrap(),
            form_title: "Feedback".into(),
            custom_responses: BTreeMap::new(),
            image_url: None,
            video_url: None,
        }
    }

    #[test]
    fn empty_csv_is_header_only() {
        assert_eq!(
            to_csv(&[]),
            "Name,Email,Company,Rating,Testimonial,Status,Submitted Date,Form,Custom Fields"
        );
    }

    #[test]
    fn csv_doubles_quotes_in_message() {
        let csv = to_csv(&[sample(TestimonialStatus::Approved, r#"They said "wow""#)]);
        let row = csv.lines().nth(1).unwrap();
        assert_eq!(
            row,
            r#"Ada Lovelace,ada@example.com,Analytical Engines,5,"They said ""wow""",approved,2025-03-14,Feedback,"#
        );
    }

    #[test]
    fn csv_flattens_custom_fields() {
        let mut t = sample(TestimonialStatus::Pending, "ok");
        t.custom_responses.insert("Role".into(), "CTO".into());
        t.custom_responses.insert("Team".into(), "Core".into());
        t.company = Some("A, B".into());
        let csv = to_csv(&[t]);
        let row = csv.lines().nth(1).unwrap();
        assert!(row.contains(r#","A, B","#));
        assert!(row.ends_with(r#","Role: CTO; Team: Core""#));
    }

    #[test]
    fn json_round_trips_and_empty_is_array() {
        let list = vec![
            sample(TestimonialStatus::Approved, "one"),
            sample(TestimonialStatus::Rejected, "two"),
        ];
        let json = to_json(&list).unwrap();
        let parsed: Vec<ExportTestimonial> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, list);
        assert_eq!(to_json(&[]).unwrap(), "[]");
    }

    #[test]
    fn social_post_truncates_long_messages() {
        let long = "a".repeat(250);
        let post = social_post(&sample(TestimonialStatus::Approved, &long));
        assert!(post.starts_with("⭐⭐⭐⭐⭐ Customer Love!\n\n\""));
        assert!(post.contains(&format!("\"{}...\"", "a".repeat(200))));
        assert!(post.ends_with("- Ada Lovelace, Analytical Engines\n\n#CustomerSuccess #Testimonial"));

        let short = social_post(&sample(TestimonialStatus::Approved, "Short"));
        assert!(short.contains("\"Short\""));
        assert!(!short.contains("..."));
    }

    #[test]
    fn widget_caps_cards_at_three_approved() {
        let mut list: Vec<_> = (0..5)
            .map(|_| sample(TestimonialStatus::Approved, "Good"))
            .collect();
        list.insert(0, sample(TestimonialStatus::Pending, "Hidden"));
        let html = widget(&list, &WidgetTheme::default());
        assert_eq!(html.matches("class=\"testimonial-card\"").count(), 3);
        assert!(!html.contains("Hidden"));
    }

    #[test]
    fn widget_escapes_submitter_text() {
        let mut t = sample(
            TestimonialStatus::Approved,
            "</p><script>alert(1)</script>'); alert('x",
        );
        t.name = "<img src=x onerror=alert(1)>".into();
        t.image_url = Some("https://cdn.example.com/a.png".into());
        let html = widget(&[t], &WidgetTheme::default());

        assert!(!html.contains("<script>alert(1)"));
        assert!(!html.contains("<img src=x"));
        assert!(html.contains("&lt;img src=x onerror=alert(1)&gt;"));
        assert!(!html.contains("'); alert('x"));
        assert!(html.contains("openTestimonialModal("));
    }

    #[test]
    fn widget_drops_script_media_urls() {
        let mut t = sample(TestimonialStatus::Approved, "Nice");
        t.image_url = Some("javascript:alert(1)".into());
        let html = widget(&[t], &WidgetTheme::default());
        assert!(!html.contains("javascript:"));
    }

    #[test]
    fn js_string_escapes_breakouts() {
        assert_eq!(js_string("a'b"), "'a\\u0027b'");
        assert_eq!(js_string("</script>"), "'\\u003c/script\\u003e'");
        assert_eq!(js_string("line\nbreak"), "'line\\u000abreak'");
    }

    #[test]
    fn advanced_formats() {
        assert!(ExportFormat::Json.is_advanced());
        assert!(ExportFormat::Widget.is_advanced());
        assert!(!ExportFormat::Csv.is_advanced());
        assert!(!ExportFormat::Social.is_advanced());
        assert_eq!("widget".parse::<ExportFormat>().unwrap(), ExportFormat::Widget);
    }
}
