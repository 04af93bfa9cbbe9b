//! Term encoding and response decoding (proptest).

use proptest::prelude::*;
use std::sync::Arc;

use trealla_driver::{
    args, build_goal, decode_bindings, encode, encode_atom, parse_value, quote_string, Arg,
    DriverError, Record, Value,
};

#[derive(Debug)]
struct Edge {
    from: &'static str,
    to: &'static str,
    weight: f64,
}

impl Record for Edge {
    fn functor(&self) -> &str {
        "edge"
    }

    fn fields(&self) -> Vec<Arg> {
        vec![Arg::atom(self.from), Arg::atom(self.to), self.weight.into()]
    }
}

#[derive(Debug)]
struct Route {
    legs: Vec<Arc<Edge>>,
}

impl Record for Route {
    fn functor(&self) -> &str {
        "route"
    }

    fn fields(&self) -> Vec<Arg> {
        let legs = self
            .legs
            .iter()
            .map(|leg| Arg::Record(Arc::clone(leg) as Arc<dyn Record>))
            .collect();
        vec![Arg::List(legs)]
    }
}

#[test]
fn test_scalar_examples() {
    assert_eq!(encode(&Arg::Int(-5)).unwrap(), "-5");
    assert_eq!(encode(&Arg::Float(3.5)).unwrap(), "3.500000");
    assert_eq!(encode(&Arg::from("hello")).unwrap(), "\"hello\"");
    assert_eq!(encode(&Arg::List(vec![])).unwrap(), "[]");
    assert_eq!(encode_atom("foo_bar2"), "foo_bar2");
    assert_eq!(encode_atom("Foo"), "'Foo'");
    assert_eq!(encode_atom(""), "[]");
}

#[test]
fn test_nested_records() {
    let route = Route {
        legs: vec![
            Arc::new(Edge {
                from: "a",
                to: "b",
                weight: 1.5,
            }),
            Arc::new(Edge {
                from: "b",
                to: "City",
                weight: 2.0,
            }),
        ],
    };
    assert_eq!(
        encode(&Arg::record(route)).unwrap(),
        "route([edge(a,b,1.500000),edge(b,'City',2.000000)])"
    );
}

#[test]
fn test_goal_with_mixed_arguments() {
    let goal = build_goal(
        "likes",
        &args![Arg::atom("mary"), "wine", 3, Arg::anon(), None::<i32>],
    )
    .unwrap();
    assert_eq!(goal, "likes(mary,\"wine\",3,_Var3,[])");
}

#[test]
fn test_first_failing_element_fails_goal() {
    let err = build_goal("p", &[Arg::Int(1), Arg::List(vec![Arg::Float(f64::NAN)])]).unwrap_err();
    assert!(matches!(err, DriverError::Unsupported(_)));
}

#[test]
fn test_decode_engine_result_line() {
    let solution = decode_bindings("   X = 1, Y = \"a\", Z = 'Big Atom', W = -2.5.\r\n");
    assert_eq!(solution.len(), 4);
    assert_eq!(solution["X"], Value::Int(1));
    assert_eq!(solution["Y"], Value::string("a"));
    assert_eq!(solution["Z"], Value::string("Big Atom"));
    assert_eq!(solution["W"], Value::Float(-2.5));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// A quoted string decodes back to the original text
    #[test]
    fn prop_quoted_string_decodes(s in ".*") {
        prop_assert_eq!(parse_value(&quote_string(&s)), Value::Str(s));
    }

    /// Integers survive encoding and decoding
    #[test]
    fn prop_int_decodes(n in any::<i64>()) {
        let term = encode(&Arg::Int(n)).unwrap();
        prop_assert_eq!(parse_value(&term), Value::Int(n));
    }

    /// Floats always render with six decimals
    #[test]
    fn prop_float_six_decimals(f in -1.0e9f64..1.0e9f64) {
        let term = encode(&Arg::Float(f)).unwrap();
        let decimals = term.rsplit('.').next().unwrap();
        prop_assert_eq!(decimals.len(), 6);
        prop_assert!(matches!(parse_value(&term), Value::Float(_) | Value::Int(_)));
    }

    /// Lowercase identifiers stay bare
    #[test]
    fn prop_plain_atoms_are_bare(name in "[a-z][a-z0-9_]{0,12}") {
        prop_assert_eq!(encode_atom(&name), name);
    }

    /// Anything starting with an uppercase letter is quoted
    #[test]
    fn prop_capitalised_atoms_are_quoted(name in "[A-Z][a-zA-Z0-9 ]{0,12}") {
        prop_assert_eq!(encode_atom(&name), format!("'{name}'"));
    }

    /// Anonymous variables are named after their position
    #[test]
    fn prop_anonymous_variables_named_by_position(n in 1usize..8) {
        let goal_args: Vec<Arg> = (0..n).map(|_| Arg::anon()).collect();
        let goal = build_goal("p", &goal_args).unwrap();
        for i in 0..n {
            let var = format!("_Var{i}");
            prop_assert!(goal.contains(&var));
        }
    }

    /// Integer bindings decode under their variable names
    #[test]
    fn prop_integer_bindings_decode(values in prop::collection::vec(any::<i64>(), 1..6)) {
        let line = values
            .iter()
            .enumerate()
            .map(|(i, v)| format!("V{i} = {v}"))
            .collect::<Vec<_>>()
            .join(", ");
        let solution = decode_bindings(&format!("   {line}.\r\n"));
        prop_assert_eq!(solution.len(), values.len());
        for (i, v) in values.iter().enumerate() {
            prop_assert_eq!(&solution[&format!("V{i}")], &Value::Int(*v));
        }
    }
}
