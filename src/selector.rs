//! Provider picker that remembers the last confirmed choice

use crate::providers::ProviderKind;

#[derive(Debug, Default)]
pub struct BackendSelector {
    last_selected: Option<ProviderKind>,
}

impl BackendSelector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn options(&self) -> &'static [ProviderKind] {
        &ProviderKind::ALL
    }

    /// The entry to highlight when the picker opens
    pub fn preselected(&self) -> ProviderKind {
        self.last_selected.unwrap_or(ProviderKind::ALL[0])
    }

    pub fn last_selected(&self) -> Option<ProviderKind> {
        self.last_selected
    }

    /// Resolves the user's answer: a provider name or a 1-based index into
    /// `options()`. `None` or an unrecognised answer counts as cancel and
    /// leaves the remembered choice untouched.
    pub fn choose(&mut self, answer: Option<&str>) -> Option<ProviderKind> {
        let answer = answer?.trim();
        let picked = match answer.parse::<usize>() {
            Ok(index) if index >= 1 => self.options().get(index - 1).copied(),
            Ok(_) => None,
            Err(_) => ProviderKind::parse(answer),
        }?;
        self.last_selected = Some(picked);
        Some(picked)
    }

    /// One line per option, marking the preselected entry
    pub fn menu(&self) -> Vec<String> {
        let current = self.preselected();
        self.options()
            .iter()
            .enumerate()
            .map(|(i, kind)| {
                let marker = if *kind == current { '*' } else { ' ' };
                format!("{} {}. {}", marker, i + 1, kind.display_name())
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remembers_only_confirmed_choices() {
        let mut selector = BackendSelector::new();
        assert_eq!(selector.preselected(), ProviderKind::Spark);

        assert_eq!(selector.choose(Some("2")), Some(ProviderKind::OpenRouter));
        assert_eq!(selector.preselected(), ProviderKind::OpenRouter);

        assert_eq!(selector.choose(None), None);
        assert_eq!(selector.choose(Some("nonsense")), None);
        assert_eq!(selector.choose(Some("0")), None);
        assert_eq!(selector.last_selected(), Some(ProviderKind::OpenRouter));

        assert_eq!(selector.choose(Some("xunfei")), Some(ProviderKind::Spark));
        assert_eq!(selector.preselected(), ProviderKind::Spark);
    }

    #[test]
    fn menu_marks_preselected_entry() {
        let mut selector = BackendSelector::new();
        selector.choose(Some("openrouter"));
        assert_eq!(selector.menu(), vec!["  1. iFlytek Spark Lite", "* 2. OpenRouter"]);
    }
}
