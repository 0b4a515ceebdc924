use std::fmt::Write as _;

use crate::domain::{CanonicalTreeView, SecondaryRecord};

const FIELD_STORE_TAG: &str = "[DB] ";
const REGISTRY_TAG: &str = "[PIJAK] ";

struct Placemark<'a> {
    name: &'a str,
    description: String,
    latitude: f64,
    longitude: f64,
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

fn document<'a>(placemarks: impl Iterator<Item = Placemark<'a>>) -> String {
    let mut out = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<kml xmlns=\"http://www.opengis.net/kml/2.2\">\n  <Document>\n",
    );
    for p in placemarks {
        // KML orders coordinates lon,lat[,alt].
        let _ = write!(
            out,
            "    <Placemark>\n      <name>{}</name>\n      <description>{}</description>\n      <Point>\n        <coordinates>{},{}</coordinates>\n      </Point>\n    </Placemark>\n",
            escape(p.name),
            escape(&p.description),
            p.longitude,
            p.latitude
        );
    }
    out.push_str("  </Document>\n</kml>\n");
    out
}

fn field_store_placemark(view: &CanonicalTreeView) -> Option<Placemark<'_>> {
    let (latitude, longitude) = view.coordinates()?;
    Some(Placemark {
        name: view.id.as_str(),
        description: format!(
            "{}{}",
            FIELD_STORE_TAG,
            view.record.tree_name.as_deref().unwrap_or("")
        ),
        latitude,
        longitude,
    })
}

fn registry_placemark<'a>(record: &'a SecondaryRecord, tag: &str) -> Placemark<'a> {
    Placemark {
        name: &record.code,
        description: format!("{}{}", tag, record.name),
        latitude: record.latitude,
        longitude: record.longitude,
    }
}

/// Both datasets, descriptions prefixed with their source.
pub fn render_combined(views: &[CanonicalTreeView], registry: &[SecondaryRecord]) -> String {
    document(
        views
            .iter()
            .filter_map(field_store_placemark)
            .chain(registry.iter().map(|r| registry_placemark(r, REGISTRY_TAG))),
    )
}

pub fn render_registry(registry: &[SecondaryRecord]) -> String {
    document(registry.iter().map(|r| registry_placemark(r, "")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TreeCondition;
    use crate::pipeline::processing::palette::registry_colors;

    fn registry(code: &str, name: &str) -> SecondaryRecord {
        SecondaryRecord {
            code: code.into(),
            name: name.into(),
            tree_status: "Dead".into(),
            condition: TreeCondition::Dead,
            latitude: 1.5,
            longitude: 124.51,
            photo_url: None,
            photo_path: None,
            colors: registry_colors(TreeCondition::Dead),
        }
    }

    #[test]
    fn registry_kml_uses_lon_lat_and_escapes() {
        let kml = render_registry(&[registry("JJK-010", "Api & <api>")]);
        assert!(kml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(kml.contains("<name>JJK-010</name>"));
        assert!(kml.contains("<description>Api &amp; &lt;api&gt;</description>"));
        assert!(kml.contains("<coordinates>124.51,1.5</coordinates>"));
        assert!(kml.trim_end().ends_with("</kml>"));
    }

    #[test]
    fn combined_kml_tags_registry_descriptions() {
        let kml = render_combined(&[], &[registry("JJK-010", "Api-api")]);
        assert!(kml.contains("<description>[PIJAK] Api-api</description>"));
        assert_eq!(kml.matches("<Placemark>").count(), 1);
    }

    #[test]
    fn empty_export_is_a_valid_document() {
        let kml = render_registry(&[]);
        assert!(kml.contains("<Document>"));
        assert!(!kml.contains("<Placemark>"));
    }
}
