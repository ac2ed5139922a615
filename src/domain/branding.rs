use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_PRIMARY_COLOR: &str = "#01004d";
pub const DEFAULT_SECONDARY_COLOR: &str = "#01b79e";
pub const DEFAULT_FONT_FAMILY: &str = "Montserrat";

pub const FONT_FAMILIES: &[&str] = &[
    "Montserrat",
    "Inter",
    "Roboto",
    "Open Sans",
    "Lato",
    "Poppins",
    "Source Sans Pro",
];

/// `#RRGGBB`, case-insensitive.
pub fn is_hex_color(value: &str) -> bool {
    value.len() == 7
        && value.starts_with('#')
        && value[1..].chars().all(|c| c.is_ascii_hexdigit())
}

/// Per-owner look applied to the public form and the widget export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branding {
    pub user_id: Uuid,
    pub logo_url: Option<String>,
    pub primary_color: String,
    pub secondary_color: String,
    pub font_family: String,
    pub updated_at: DateTime<Utc>,
}

impl Branding {
    pub fn default_for(user_id: Uuid) -> Self {
        Self {
            user_id,
            logo_url: None,
            primary_color: DEFAULT_PRIMARY_COLOR.to_string(),
            secondary_color: DEFAULT_SECONDARY_COLOR.to_string(),
            font_family: DEFAULT_FONT_FAMILY.to_string(),
            updated_at: Utc::now(),
        }
    }

    pub fn theme(&self) -> WidgetTheme {
        WidgetTheme {
            primary_color: self.primary_color.clone(),
            secondary_color: self.secondary_color.clone(),
            font_family: self.font_family.clone(),
        }
    }
}

/// Colors and font used when rendering the embeddable widget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WidgetTheme {
    pub primary_color: String,
    pub secondary_color: String,
    pub font_family: String,
}

impl Default for WidgetTheme {
    fn default() -> Self {
        Self {
            primary_color: DEFAULT_PRIMARY_COLOR.to_string(),
            secondary_color: DEFAULT_SECONDARY_COLOR.to_string(),
            font_family: DEFAULT_FONT_FAMILY.to_string(),
        }
    }
}

impl WidgetTheme {
    /// Replaces anything that is not a plain hex color or a known font with the default.
    ///
    /// Theme values end up inside `style` attributes and script literals.
    pub fn sanitized(&self) -> Self {
        let color = |value: &str, fallback: &str| {
            if is_hex_color(value) {
                value.to_string()
            } else {
                fallback.to_string()
            }
        };
        let font = if FONT_FAMILIES.contains(&self.font_family.as_str()) {
            self.font_family.clone()
        } else {
            DEFAULT_FONT_FAMILY.to_string()
        };
        Self {
            primary_color: color(&self.primary_color, DEFAULT_PRIMARY_COLOR),
            secondary_color: color(&self.secondary_color, DEFAULT_SECONDARY_COLOR),
            font_family: font,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_colors() {
        assert!(is_hex_color("#01b79E"));
        assert!(!is_hex_color("01b79e"));
        assert!(!is_hex_color("#01b79"));
        assert!(!is_hex_color("#01b79g"));
        assert!(!is_hex_color("red;}"));
    }

    #[test]
    fn sanitized_theme_drops_injected_values() {
        let theme = WidgetTheme {
            primary_color: "red'><script>".into(),
            secondary_color: "#123456".into(),
            font_family: "x', sans-serif;}</style>".into(),
        }
        .sanitized();
        assert_eq!(theme.primary_color, DEFAULT_PRIMARY_COLOR);
        assert_eq!(theme.secondary_color, "#123456");
        assert_eq!(theme.font_family, DEFAULT_FONT_FAMILY);
    }
}
