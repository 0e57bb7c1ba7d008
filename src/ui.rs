//! Interactive instance selection.

use console::{Style, Term};
use dialoguer::{Select, theme::ColorfulTheme};

use crate::ec2::InstanceRecord;
use crate::error::Result;

/// Blocking external chooser: a list of lines and an optional header in, the
/// chosen line out, `None` on cancel.
pub trait Chooser {
    fn choose(&self, items: &[String], header: Option<&str>) -> Result<Option<String>>;
}

/// Arrow-key list chooser backed by dialoguer.
pub struct SelectChooser;

impl Chooser for SelectChooser {
    fn choose(&self, items: &[String], header: Option<&str>) -> Result<Option<String>> {
        let term = Term::stderr();

        if let Some(header) = header {
            eprintln!("{}", header);
        }

        let theme = ColorfulTheme {
            active_item_style: Style::new().cyan(),
            active_item_prefix: Style::new().cyan().apply_to(">".to_string()),
            inactive_item_prefix: Style::new().apply_to(" ".to_string()),
            ..ColorfulTheme::default()
        };

        let selection = Select::with_theme(&theme)
            .items(items)
            .default(0)
            .interact_on_opt(&term)
            .map_err(|e| crate::error::TfmError::Other(e.into()))?;

        Ok(selection.map(|index| items[index].clone()))
    }
}

/// Renders instances for selection and resolves the operator's choice.
pub struct Selector {
    records: Vec<InstanceRecord>,
}

impl Selector {
    /// The sort is stable: named instances come first, input order is
    /// otherwise preserved.
    pub fn new(mut records: Vec<InstanceRecord>) -> Self {
        records.sort_by_key(|r| !r.has_name());
        Self { records }
    }

    pub fn records(&self) -> &[InstanceRecord] {
        &self.records
    }

    /// Fixed single-line rendering; also the resolution key.
    pub fn render(record: &InstanceRecord) -> String {
        format!(
            "{} ({}, {}) ({})",
            if record.name.is_empty() {
                "<No Name>"
            } else {
                &record.name
            },
            record.instance_type,
            record.public_ip.as_deref().unwrap_or("-"),
            record.instance_id,
        )
    }

    pub fn rendered(&self) -> Vec<String> {
        self.records.iter().map(Self::render).collect()
    }

    /// Run the chooser and resolve the picked line back to its record by
    /// exact string equality of the rendered form. `None` when the operator
    /// cancelled.
    pub fn select(&self, chooser: &dyn Chooser) -> Result<Option<&InstanceRecord>> {
        let items = self.rendered();
        let choice = chooser.choose(&items, None)?;

        Ok(choice.and_then(|line| {
            self.records
                .iter()
                .zip(items.iter())
                .find(|(_, rendered)| **rendered == line)
                .map(|(record, _)| record)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ec2::OsFamily;

    struct FixedChooser(Option<String>);

    impl Chooser for FixedChooser {
        fn choose(&self, _items: &[String], _header: Option<&str>) -> Result<Option<String>> {
            Ok(self.0.clone())
        }
    }

    fn record(id: &str, name: &str) -> InstanceRecord {
        InstanceRecord {
            instance_id: id.to_string(),
            name: name.to_string(),
            instance_type: "t3.micro".to_string(),
            region: "us-east-1".to_string(),
            public_ip: Some("203.0.113.7".to_string()),
            os_family: OsFamily::Ubuntu,
        }
    }

    #[test]
    fn test_sort_puts_named_instances_first() {
        let selector = Selector::new(vec![
            record("i-1", ""),
            record("i-2", "web1"),
            record("i-3", ""),
            record("i-4", "db1"),
        ]);
        let ids: Vec<&str> = selector
            .records()
            .iter()
            .map(|r| r.instance_id.as_str())
            .collect();
        assert_eq!(ids, vec!["i-2", "i-4", "i-1", "i-3"]);
    }

    #[test]
    fn test_sort_is_stable_within_groups() {
        let selector = Selector::new(vec![
            record("i-b", "b"),
            record("i-a", "a"),
            record("i-2", ""),
            record("i-1", ""),
        ]);
        let ids: Vec<&str> = selector
            .records()
            .iter()
            .map(|r| r.instance_id.as_str())
            .collect();
        // Not alphabetical: relative input order is kept within each group.
        assert_eq!(ids, vec!["i-b", "i-a", "i-2", "i-1"]);
    }

    #[test]
    fn test_render_round_trips_through_selection() {
        let selector = Selector::new(vec![record("i-1", "web1"), record("i-2", "db1")]);
        for rec in selector.records().to_vec() {
            let chooser = FixedChooser(Some(Selector::render(&rec)));
            let picked = selector.select(&chooser).unwrap().unwrap();
            assert_eq!(*picked, rec);
        }
    }

    #[test]
    fn test_render_format() {
        let line = Selector::render(&record("i-0450bdd70834f2294", "web1"));
        assert_eq!(line, "web1 (t3.micro, 203.0.113.7) (i-0450bdd70834f2294)");
    }

    #[test]
    fn test_render_unnamed_placeholder_and_missing_ip() {
        let mut rec = record("i-1", "");
        rec.public_ip = None;
        assert_eq!(Selector::render(&rec), "<No Name> (t3.micro, -) (i-1)");
    }

    #[test]
    fn test_cancel_resolves_to_none() {
        let selector = Selector::new(vec![record("i-1", "web1")]);
        let picked = selector.select(&FixedChooser(None)).unwrap();
        assert!(picked.is_none());
    }

    #[test]
    fn test_unknown_line_resolves_to_none() {
        let selector = Selector::new(vec![record("i-1", "web1")]);
        let chooser = FixedChooser(Some("something else entirely".to_string()));
        assert!(selector.select(&chooser).unwrap().is_none());
    }
}
