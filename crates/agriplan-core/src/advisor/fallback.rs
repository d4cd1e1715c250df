//! Rule-based actions used when no provider answer is available.
//!
//! Problems are matched by substring against a fixed vocabulary covering
//! Thai and English phrasing. Every matching rule contributes one action,
//! in table order; a seasonal scouting inspection is always appended.

use super::ProposedAction;

/// Terms that indicate a sugarcane disease report.
pub const DISEASE_VOCABULARY: &[&str] = &[
    "ใบขาว",
    "กอตะไคร้",
    "แส้ดำ",
    "จุดวงแหวน",
    "white leaf",
    "grassy shoot",
    "smut",
    "ring spot",
];

struct FallbackRule {
    triggers: &'static [&'static str],
    action_type: &'static str,
    title: &'static str,
    quantity: Option<f64>,
    unit: Option<&'static str>,
    notes: &'static str,
}

const FALLBACK_RULES: &[FallbackRule] = &[
    FallbackRule {
        triggers: &["พายุ", "storm", "flood", "น้ำท่วม"],
        action_type: "advisory",
        title: "Prepare drainage and dig furrows",
        quantity: None,
        unit: None,
        notes: "Avoid standing water for longer than 48 hours",
    },
    FallbackRule {
        triggers: &["แห้ง", "แล้ง", "drought", "dry"],
        action_type: "irrigation",
        title: "Supplemental irrigation for low soil moisture",
        quantity: Some(20.0),
        unit: Some("mm"),
        notes: "Keep the rate within pump capacity",
    },
    FallbackRule {
        triggers: &["ใบขาว", "กอตะไคร้", "แส้ดำ", "white leaf", "grassy shoot", "smut"],
        action_type: "inspect",
        title: "Inspect for sugarcane disease symptoms",
        quantity: None,
        unit: None,
        notes: "Sample 5 spots per field and take photos",
    },
];

const SEASONAL_SCOUT: FallbackRule = FallbackRule {
    triggers: &[],
    action_type: "inspect",
    title: "Seasonal disease scouting",
    quantity: None,
    unit: None,
    notes: "Check for ring spot and red rot during humid weeks",
};

impl FallbackRule {
    fn matches(&self, haystack: &str) -> bool {
        self.triggers.iter().any(|t| haystack.contains(t))
    }

    fn to_action(&self) -> ProposedAction {
        ProposedAction {
            action_type: self.action_type.to_owned(),
            title: self.title.to_owned(),
            quantity: self.quantity,
            unit: self.unit.map(str::to_owned),
            notes: self.notes.to_owned(),
        }
    }
}

fn haystack(problems: &[String]) -> String {
    problems.join(" ").to_lowercase()
}

/// Deterministic actions for `problems`.
pub fn fallback_actions(problems: &[String]) -> Vec<ProposedAction> {
    let text = haystack(problems);
    FALLBACK_RULES
        .iter()
        .filter(|rule| rule.matches(&text))
        .chain(std::iter::once(&SEASONAL_SCOUT))
        .map(FallbackRule::to_action)
        .collect()
}

/// Whether any problem mentions a known disease.
pub fn mentions_disease(problems: &[String]) -> bool {
    let text = haystack(problems);
    DISEASE_VOCABULARY.iter().any(|t| text.contains(t))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn problems(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_owned()).collect()
    }

    fn types(actions: &[ProposedAction]) -> Vec<&str> {
        actions.iter().map(|a| a.action_type.as_str()).collect()
    }

    #[test]
    fn no_problems_yields_only_seasonal_scout() {
        let actions = fallback_actions(&[]);
        assert_eq!(types(&actions), ["inspect"]);
        assert_eq!(actions[0].title, "Seasonal disease scouting");
    }

    #[test]
    fn thai_storm_and_dry_soil() {
        let actions = fallback_actions(&problems(&["มีพายุเข้า", "ดินแห้ง"]));
        assert_eq!(types(&actions), ["advisory", "irrigation", "inspect"]);
        assert_eq!(actions[1].quantity, Some(20.0));
        assert_eq!(actions[1].unit.as_deref(), Some("mm"));
    }

    #[test]
    fn english_matching_is_case_insensitive() {
        let actions = fallback_actions(&problems(&["Storm expected", "White Leaf spotted"]));
        assert_eq!(types(&actions), ["advisory", "inspect", "inspect"]);
        assert_eq!(actions[1].title, "Inspect for sugarcane disease symptoms");
    }

    #[test]
    fn each_rule_fires_once() {
        let actions = fallback_actions(&problems(&["dry", "drought", "แห้ง"]));
        assert_eq!(types(&actions), ["irrigation", "inspect"]);
    }

    #[test]
    fn disease_detection() {
        assert!(mentions_disease(&problems(&["พบโรคใบขาว"])));
        assert!(mentions_disease(&problems(&["Ring spot on leaves"])));
        assert!(!mentions_disease(&problems(&["storm"])));
        assert!(!mentions_disease(&[]));
    }
}
