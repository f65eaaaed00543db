use courier_pattern::{patternize, Pattern, PatternOptions};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

#[test]
fn test_bind_then_render() {
    let pattern = Pattern::parse("{{a}}-{{b}}").unwrap();
    let captures = pattern.matches("1-2").unwrap();
    assert_eq!(captures["a"], "1");
    assert_eq!(captures["b"], "2");

    let rendered = pattern
        .render(|var| captures.get(&var.param).cloned())
        .unwrap();
    assert_eq!(rendered, "1-2");
}

#[test]
fn test_origin_segments() {
    let pattern = patternize("https://{{env}}.example.com", PatternOptions::separated('.')).unwrap();
    assert_eq!(pattern.matches("https://stage.example.com").unwrap()["env"], "stage");
    assert!(pattern.matches("https://a.b.example.com").is_none());
}

#[test]
fn test_secret_hint_is_kept() {
    let pattern = Pattern::parse("Bearer {{@token}}").unwrap();
    assert!(pattern.vars()[0].hint.is_redacted());
}

proptest! {
    #[test]
    fn prop_captures_render_back_to_literal(
        a in "[a-z0-9]{1,8}",
        b in "[a-z0-9]{1,8}",
    ) {
        let pattern = patternize("/{{a}}/{{b}}", PatternOptions::separated('/')).unwrap();
        let literal = format!("/{a}/{b}");
        let captures = pattern.matches(&literal).unwrap();
        let rendered = pattern.render(|var| captures.get(&var.param).cloned()).unwrap();
        prop_assert_eq!(rendered, literal);
    }

    #[test]
    fn prop_literal_patterns_match_only_themselves(text in "[^{}]{0,16}", other in "[^{}]{0,16}") {
        let pattern = Pattern::parse(&text).unwrap();
        prop_assert!(pattern.is_trivial());
        prop_assert_eq!(pattern.matches(&other).is_some(), text == other);
    }
}
