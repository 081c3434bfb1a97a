//! Executes a compiled [`Program`] against an [`Event`] (§4.5).
//!
//! Deterministic and side-effect-free. Type mismatches at a comparison
//! (e.g. an integer field against a string literal) evaluate to
//! `false` rather than raising; a missing field behaves as "not
//! equal" / "not in" / non-matching.

use sentinel_model::{Event, FieldValue};

use super::ast::Literal;
use super::bytecode::{Op, Program};

#[derive(Debug, Clone)]
enum StackValue {
    Field(FieldValue),
    List(Vec<Literal>),
}

pub fn evaluate(program: &Program, event: &Event) -> bool {
    let mut stack: Vec<StackValue> = Vec::new();
    let mut pc = 0;

    while pc < program.ops.len() {
        match &program.ops[pc] {
            Op::LoadField(path) => stack.push(StackValue::Field(event.field(path))),
            Op::LoadInt(n) => stack.push(StackValue::Field(FieldValue::Int(*n))),
            Op::LoadStr(s) => stack.push(StackValue::Field(FieldValue::Str(s.clone()))),
            Op::LoadList(items) => stack.push(StackValue::List(items.clone())),
            Op::Eq | Op::Ne | Op::Lt | Op::Gt | Op::Le | Op::Ge => {
                let rhs = pop_field(&mut stack);
                let lhs = pop_field(&mut stack);
                let result = compare(&program.ops[pc], &lhs, &rhs);
                stack.push(StackValue::Field(FieldValue::Bool(result)));
            }
            Op::RegexMatch(idx) | Op::RegexNotMatch(idx) => {
                let lhs = pop_field(&mut stack);
                let negate = matches!(program.ops[pc], Op::RegexNotMatch(_));
                let matched = match lhs.as_str() {
                    Some(s) => program.regexes[*idx].is_match(s),
                    None => false,
                };
                stack.push(StackValue::Field(FieldValue::Bool(matched ^ negate)));
            }
            Op::In => {
                let list = match stack.pop() {
                    Some(StackValue::List(items)) => items,
                    _ => Vec::new(),
                };
                let lhs = pop_field(&mut stack);
                let found = list.iter().any(|item| literal_eq(item, &lhs));
                stack.push(StackValue::Field(FieldValue::Bool(found)));
            }
            Op::Not => {
                let v = pop_field(&mut stack);
                let b = v.as_bool().unwrap_or(false);
                stack.push(StackValue::Field(FieldValue::Bool(!b)));
            }
            Op::JumpIfFalseKeep(target) => {
                let is_false = matches!(stack.last(), Some(StackValue::Field(FieldValue::Bool(false))));
                if is_false {
                    pc = *target;
                    continue;
                }
                stack.pop();
            }
            Op::JumpIfTrueKeep(target) => {
                let is_true = matches!(stack.last(), Some(StackValue::Field(FieldValue::Bool(true))));
                if is_true {
                    pc = *target;
                    continue;
                }
                stack.pop();
            }
        }
        pc += 1;
    }

    match stack.pop() {
        Some(StackValue::Field(FieldValue::Bool(b))) => b,
        _ => false,
    }
}

fn pop_field(stack: &mut Vec<StackValue>) -> FieldValue {
    match stack.pop() {
        Some(StackValue::Field(v)) => v,
        Some(StackValue::List(_)) | None => FieldValue::Missing,
    }
}

fn literal_eq(literal: &Literal, value: &FieldValue) -> bool {
    match (literal, value) {
        (Literal::Int(a), FieldValue::Int(b)) => a == b,
        (Literal::Str(a), FieldValue::Str(b)) => a == b,
        _ => false,
    }
}

fn compare(op: &Op, lhs: &FieldValue, rhs: &FieldValue) -> bool {
    use std::cmp::Ordering;

    let ordering = match (lhs, rhs) {
        (FieldValue::Int(a), FieldValue::Int(b)) => a.partial_cmp(b),
        (FieldValue::Str(a), FieldValue::Str(b)) => a.partial_cmp(b),
        (FieldValue::Bool(a), FieldValue::Bool(b)) => a.partial_cmp(b),
        _ => None,
    };

    match (op, ordering) {
        (Op::Eq, Some(Ordering::Equal)) => true,
        (Op::Eq, _) => false,
        (Op::Ne, Some(o)) => o != Ordering::Equal,
        (Op::Ne, None) => true,
        (Op::Lt, Some(Ordering::Less)) => true,
        (Op::Gt, Some(Ordering::Greater)) => true,
        (Op::Le, Some(Ordering::Less | Ordering::Equal)) => true,
        (Op::Ge, Some(Ordering::Greater | Ordering::Equal)) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::super::parser::parse;
    use super::*;
    use sentinel_model::{Event, EventType, IfaceName, LinkFlags, LinkPayload, Payload};

    fn link_event(flags: u32) -> Event {
        Event::new(
            EventType::Link,
            16,
            0,
            Payload::Link(LinkPayload {
                ifindex: 2,
                flags: LinkFlags::from_bits(flags),
                mtu: Some(1500),
                link_kind: None,
                mac_address: None,
            }),
        )
        .with_interface(IfaceName::new("eth0").unwrap())
    }

    fn eval(src: &str, event: &Event) -> bool {
        let ast = parse(src).unwrap();
        let program = super::super::bytecode::compile(&ast).unwrap();
        evaluate(&program, event)
    }

    #[test]
    fn matches_simple_equality() {
        let event = link_event(LinkFlags::UP.bits());
        assert!(eval("link.flags.raw == 1", &event));
        assert!(!eval("link.flags.raw == 256", &event));
    }

    #[test]
    fn and_short_circuits() {
        let event = link_event(LinkFlags::UP.bits() | LinkFlags::PROMISC.bits());
        assert!(eval(
            "link.flags.raw == 257 AND link.ifindex == 2",
            &event
        ));
        assert!(!eval(
            "link.flags.raw == 1 AND link.ifindex == 2",
            &event
        ));
    }

    #[test]
    fn or_and_not() {
        let event = link_event(0);
        assert!(eval("link.flags.raw == 1 OR link.flags.raw == 0", &event));
        assert!(eval("NOT (link.flags.raw == 1)", &event));
    }

    #[test]
    fn bool_field_compared_to_int_is_a_type_mismatch() {
        let event = link_event(LinkFlags::UP.bits());
        assert!(!eval("link.flags.up == 1", &event));
    }

    #[test]
    fn regex_match_on_string_field() {
        let event = link_event(0).with_interface(IfaceName::new("eth0").unwrap());
        assert!(eval(r#"interface =~ "^eth\\d+$""#, &event));
        assert!(eval(r#"interface !~ "^wlan""#, &event));
    }

    #[test]
    fn missing_field_is_not_equal_and_not_in() {
        let event = link_event(0);
        assert!(!eval("addr.prefix_len == 24", &event));
        assert!(!eval("message_type IN [99]", &event));
    }

    #[test]
    fn type_mismatch_evaluates_false_without_panicking() {
        let event = link_event(0);
        assert!(!eval("sequence == \"abc\"", &event));
    }

    #[test]
    fn in_operator_matches_list_membership() {
        let event = link_event(0);
        assert!(eval("message_type IN [15, 16, 17]", &event));
        assert!(!eval("message_type IN [1, 2, 3]", &event));
    }
}
