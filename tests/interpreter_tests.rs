// Integration tests for the Refl interpreter
//
// These tests verify the interpreter's behavior by running complete programs
// (assembled with the `ast::build` helpers) and checking the results. Tests cover:
// - Variable declaration, implicit globals and scoping
// - Control flow (if/elif/else, while, for, break/continue/return)
// - Functions, closures, methods and `args`
// - Tables, cloning and iteration order
// - Custom iterators
// - Errors, panics and cancellation
// - Timers, events and promises on the event loop
// - Builtins (`$`, eval, refl, io)

use pretty_assertions::assert_eq;
use refl::ast::build::*;
use refl::ast::{BinaryOp, JsonParser, Stmt, UnaryOp};
use refl::errors::{ErrorKind, Panic};
use refl::interpreter::{Environment, Interpreter, Object, Options, OutputBuffer};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

struct Outcome {
    result: Result<Object, Panic>,
    env: Environment,
    output: OutputBuffer,
}

impl Outcome {
    fn value(&self) -> Object {
        self.result.clone().expect("program should succeed")
    }

    fn panic(&self) -> Panic {
        self.result.clone().expect_err("program should panic")
    }

    fn global(&self, name: &str) -> Object {
        self.env.get(name).unwrap_or(Object::Nil)
    }

    fn output(&self) -> String {
        String::from_utf8(self.output.lock().clone()).unwrap()
    }
}

fn run_with(options: Options, statements: Vec<Stmt>) -> Outcome {
    let output = OutputBuffer::default();
    let interp = Interpreter::new(options.with_output(output.clone()).with_parser(Arc::new(JsonParser)));
    let env = Environment::new();
    let result = interp.run(&program(statements), &env);
    Outcome { result, env, output }
}

fn run(statements: Vec<Stmt>) -> Outcome {
    run_with(Options::new(), statements)
}

fn add(left: refl::ast::Expr, right: refl::ast::Expr) -> refl::ast::Expr {
    binary(left, BinaryOp::Add, right)
}

fn increment(name: &str) -> Stmt {
    expr(assign(ident(name), add(ident(name), num(1.0))))
}

#[test]
fn test_var_and_arithmetic() {
    let outcome = run(vec![var("x", num(5.0)), expr(add(ident("x"), num(3.0)))]);
    assert_eq!(outcome.value(), Object::Number(8.0));
}

#[test]
fn test_division_and_modulo_by_zero_panic() {
    let outcome = run(vec![expr(binary(num(1.0), BinaryOp::Div, num(0.0)))]);
    assert!(outcome.panic().message.contains("division by zero"));

    let outcome = run(vec![expr(binary(num(1.0), BinaryOp::Mod, num(0.0)))]);
    assert!(outcome.panic().message.contains("modulo by zero"));
}

#[test]
fn test_make_counter_closure_keeps_state() {
    let outcome = run(vec![
        var(
            "makeCounter",
            func(
                &[],
                vec![
                    var("count", num(0.0)),
                    ret(Some(func(&[], vec![increment("count"), ret(Some(ident("count")))]))),
                ],
            ),
        ),
        var("counter", call(ident("makeCounter"), vec![])),
        var("a", call(ident("counter"), vec![])),
        var("b", call(ident("counter"), vec![])),
        var("c", call(ident("counter"), vec![])),
    ]);
    assert!(outcome.result.is_ok());
    assert_eq!(outcome.global("a"), Object::Number(1.0));
    assert_eq!(outcome.global("b"), Object::Number(2.0));
    assert_eq!(outcome.global("c"), Object::Number(3.0));
    // `count` lives in the call frame, not the globals
    assert!(outcome.env.get("count").is_none());
}

#[test]
fn test_closures_in_for_body_capture_each_iteration() {
    let outcome = run(vec![
        var("fs", object(vec![])),
        for_in(
            "k",
            Some("v"),
            array(vec![num(10.0), num(20.0)]),
            vec![expr(assign(index(ident("fs"), ident("k")), func(&[], vec![ret(Some(ident("v")))])))],
        ),
        var("first", call(index(ident("fs"), num(0.0)), vec![])),
        var("second", call(index(ident("fs"), num(1.0)), vec![])),
    ]);
    assert!(outcome.result.is_ok());
    assert_eq!(outcome.global("first"), Object::Number(10.0));
    assert_eq!(outcome.global("second"), Object::Number(20.0));
}

#[test]
fn test_closure_sees_later_assignment_to_captured_variable() {
    let outcome = run(vec![
        var("x", num(1.0)),
        var("g", func(&[], vec![ret(Some(ident("x")))])),
        expr(assign(ident("x"), num(7.0))),
        expr(call(ident("g"), vec![])),
    ]);
    assert_eq!(outcome.value(), Object::Number(7.0));
}

#[test]
fn test_assignment_without_var_creates_global() {
    let outcome = run(vec![
        var("f", func(&[], vec![expr(assign(ident("y"), num(42.0)))])),
        expr(call(ident("f"), vec![])),
        expr(ident("y")),
    ]);
    assert_eq!(outcome.value(), Object::Number(42.0));
    assert_eq!(outcome.global("y"), Object::Number(42.0));
}

#[test]
fn test_var_in_block_does_not_leak() {
    let outcome = run(vec![
        var("z", num(1.0)),
        scope(vec![var("z", num(2.0)), var("w", num(5.0))]),
        expr(ident("z")),
    ]);
    assert_eq!(outcome.value(), Object::Number(1.0));
    assert!(outcome.env.get("w").is_none());
}

#[test]
fn test_assignment_updates_nearest_binding() {
    let outcome = run(vec![
        var("x", num(1.0)),
        scope(vec![expr(assign(ident("x"), num(2.0)))]),
        expr(ident("x")),
    ]);
    assert_eq!(outcome.value(), Object::Number(2.0));
}

#[test]
fn test_if_elif_else_chain() {
    let classify = |n: f64| {
        run(vec![
            var("n", num(n)),
            var("out", string("")),
            if_elif(
                binary(ident("n"), BinaryOp::Lt, num(0.0)),
                vec![expr(assign(ident("out"), string("negative")))],
                vec![(
                    binary(ident("n"), BinaryOp::Eq, num(0.0)),
                    vec![expr(assign(ident("out"), string("zero")))],
                )],
                Some(vec![expr(assign(ident("out"), string("positive")))]),
            ),
        ])
        .global("out")
    };
    assert_eq!(classify(-3.0), Object::from("negative"));
    assert_eq!(classify(0.0), Object::from("zero"));
    assert_eq!(classify(7.0), Object::from("positive"));
}

#[test]
fn test_while_with_break_and_continue() {
    // sum odd numbers below 10, stopping at 7
    let outcome = run(vec![
        var("i", num(0.0)),
        var("sum", num(0.0)),
        while_loop(
            num(1.0),
            vec![
                increment("i"),
                if_else(binary(ident("i"), BinaryOp::Gt, num(7.0)), vec![brk()], None),
                if_else(
                    binary(binary(ident("i"), BinaryOp::Mod, num(2.0)), BinaryOp::Eq, num(0.0)),
                    vec![cont()],
                    None,
                ),
                expr(assign(ident("sum"), add(ident("sum"), ident("i")))),
            ],
        ),
        expr(ident("sum")),
    ]);
    assert_eq!(outcome.value(), Object::Number(1.0 + 3.0 + 5.0 + 7.0));
}

#[test]
fn test_return_from_inside_loop() {
    let outcome = run(vec![
        var(
            "find",
            func(
                &["table", "wanted"],
                vec![
                    for_in(
                        "k",
                        Some("v"),
                        ident("table"),
                        vec![if_else(
                            binary(ident("v"), BinaryOp::Eq, ident("wanted")),
                            vec![ret(Some(ident("k")))],
                            None,
                        )],
                    ),
                    ret(Some(num(-1.0))),
                ],
            ),
        ),
        expr(call(
            ident("find"),
            vec![array(vec![string("a"), string("b"), string("c")]), string("c")],
        )),
    ]);
    assert_eq!(outcome.value(), Object::Number(2.0));
}

#[test]
fn test_numeric_keys_iterate_first_in_ascending_order() {
    let outcome = run(vec![
        var("t", object(vec![])),
        expr(assign(index(ident("t"), string("b")), num(1.0))),
        expr(assign(index(ident("t"), num(3.0)), string("c"))),
        expr(assign(index(ident("t"), num(-1.0)), string("z"))),
        expr(assign(index(ident("t"), string("a")), num(2.0))),
        expr(assign(index(ident("t"), num(1.5)), string("b"))),
        var("keys", string("")),
        for_in("k", None, ident("t"), vec![expr(assign(ident("keys"), add(add(ident("keys"), ident("k")), string(","))))]),
        expr(ident("keys")),
    ]);
    let keys = outcome.value().to_string();
    assert!(keys.starts_with("-1,1.5,3,"), "got {}", keys);
    assert_eq!(keys.len(), "-1,1.5,3,a,b,".len());
}

#[test]
fn test_array_literal_and_len() {
    let outcome = run(vec![
        var("xs", array(vec![num(10.0), num(20.0), num(30.0)])),
        expr(add(
            call(ident("len"), vec![ident("xs")]),
            index(ident("xs"), num(2.0)),
        )),
    ]);
    assert_eq!(outcome.value(), Object::Number(33.0));
}

#[test]
fn test_clone_is_recursive() {
    let outcome = run(vec![
        var("orig", object(vec![("a", num(1.0)), ("inner", object(vec![("v", num(1.0))]))])),
        var("copy", call(ident("clone"), vec![ident("orig")])),
        expr(assign(dot(ident("copy"), "a"), num(2.0))),
        expr(assign(dot(dot(ident("copy"), "inner"), "v"), num(2.0))),
        expr(add(
            binary(dot(ident("orig"), "a"), BinaryOp::Mul, num(10.0)),
            dot(dot(ident("orig"), "inner"), "v"),
        )),
    ]);
    assert_eq!(outcome.value(), Object::Number(11.0));
}

/// `Range = { new: fn(self, from, to) { return { from, to, __iter: ... } } }`
fn range_class() -> Stmt {
    let iter_body = vec![
        var("i", dot(ident("self"), "from")),
        while_loop(
            binary(ident("i"), BinaryOp::Lt, dot(ident("self"), "to")),
            vec![
                increment("calls"),
                if_else(
                    unary(UnaryOp::Not, call(ident("yield"), vec![ident("i"), ident("i")])),
                    vec![ret(None)],
                    None,
                ),
                increment("i"),
            ],
        ),
    ];
    var(
        "Range",
        object(vec![(
            "new",
            func(
                &["self", "from", "to"],
                vec![ret(Some(object(vec![
                    ("from", ident("from")),
                    ("to", ident("to")),
                    ("__iter", func(&["self", "yield"], iter_body)),
                ])))],
            ),
        )]),
    )
}

#[test]
fn test_custom_iterator_feeds_loop() {
    let outcome = run(vec![
        var("calls", num(0.0)),
        range_class(),
        var("sum", num(0.0)),
        for_in(
            "k",
            Some("v"),
            method(ident("Range"), "new", vec![num(5.0), num(10.0)]),
            vec![expr(assign(ident("sum"), add(ident("sum"), ident("v"))))],
        ),
        expr(ident("sum")),
    ]);
    assert_eq!(outcome.value(), Object::Number(35.0));
    assert_eq!(outcome.global("calls"), Object::Number(5.0));
}

#[test]
fn test_custom_iterator_stops_after_break() {
    let outcome = run(vec![
        var("calls", num(0.0)),
        range_class(),
        var("sum", num(0.0)),
        for_in(
            "k",
            Some("v"),
            method(ident("Range"), "new", vec![num(5.0), num(10.0)]),
            vec![
                if_else(binary(ident("v"), BinaryOp::Eq, num(8.0)), vec![brk()], None),
                expr(assign(ident("sum"), add(ident("sum"), ident("v")))),
            ],
        ),
        expr(ident("sum")),
    ]);
    assert_eq!(outcome.value(), Object::Number(5.0 + 6.0 + 7.0));
    assert_eq!(outcome.global("calls"), Object::Number(4.0));
}

#[test]
fn test_range_builtin_with_negative_step() {
    let outcome = run(vec![
        var("out", string("")),
        for_in(
            "i",
            Some("n"),
            call(ident("range"), vec![num(3.0), num(0.0), num(-1.0)]),
            vec![expr(assign(ident("out"), add(ident("out"), ident("n"))))],
        ),
        expr(ident("out")),
    ]);
    assert_eq!(outcome.value(), Object::from("321"));
}

#[test]
fn test_method_chaining_passes_receiver() {
    let step = |op: BinaryOp| {
        func(
            &["self", "n"],
            vec![
                expr(assign(dot(ident("self"), "value"), binary(dot(ident("self"), "value"), op, ident("n")))),
                ret(Some(ident("self"))),
            ],
        )
    };
    let outcome = run(vec![
        var("calc", object(vec![("value", num(0.0)), ("add", step(BinaryOp::Add)), ("mul", step(BinaryOp::Mul))])),
        expr(dot(
            method(
                method(method(ident("calc"), "add", vec![num(2.0)]), "add", vec![num(2.0)]),
                "mul",
                vec![num(2.0)],
            ),
            "value",
        )),
    ]);
    assert_eq!(outcome.value(), Object::Number(8.0));
}

#[test]
fn test_args_and_missing_parameters() {
    let outcome = run(vec![
        var("count", func(&["a"], vec![ret(Some(call(ident("len"), vec![ident("args")])))])),
        var("second", func(&["a", "b"], vec![ret(Some(call(ident("type"), vec![ident("b")])))])),
        var("n", call(ident("count"), vec![num(1.0), num(2.0), num(3.0)])),
        var("t", call(ident("second"), vec![num(1.0)])),
    ]);
    assert!(outcome.result.is_ok());
    assert_eq!(outcome.global("n"), Object::Number(3.0));
    assert_eq!(outcome.global("t"), Object::from("nil"));
}

#[test]
fn test_dollar_reads_globals_past_shadowing() {
    let outcome = run(vec![
        var("x", num(10.0)),
        var("f", func(&[], vec![var("x", num(20.0)), ret(Some(add(dot(ident("$"), "x"), ident("x"))))])),
        expr(call(ident("f"), vec![])),
    ]);
    assert_eq!(outcome.value(), Object::Number(30.0));
}

#[test]
fn test_dollar_is_read_only() {
    let outcome = run(vec![expr(assign(dot(ident("$"), "x"), num(1.0)))]);
    assert_eq!(outcome.panic().message, "cannot modify $ object directly");
}

#[test]
fn test_logical_operators_short_circuit() {
    let outcome = run(vec![
        var("a", binary(nil(), BinaryOp::Or, string("default"))),
        var("b", binary(num(0.0), BinaryOp::And, call(ident("undefined_fn"), vec![]))),
        var("c", binary(num(1.0), BinaryOp::And, num(2.0))),
    ]);
    assert!(outcome.result.is_ok());
    assert_eq!(outcome.global("a"), Object::from("default"));
    assert_eq!(outcome.global("b"), Object::Number(0.0));
    assert_eq!(outcome.global("c"), Object::Number(2.0));
}

#[test]
fn test_type_errors_are_panics() {
    let outcome = run(vec![expr(call(num(5.0), vec![]))]);
    let panic = outcome.panic();
    assert_eq!(panic.kind, ErrorKind::NotCallable);
    assert_eq!(panic.message, "attempt to call non-function");

    let outcome = run(vec![var("n", num(5.0)), expr(dot(ident("n"), "x"))]);
    assert_eq!(outcome.panic().message, "cannot access member of non-indexable object");

    let outcome = run(vec![expr(assign(num(1.0), num(2.0)))]);
    assert_eq!(outcome.panic().kind, ErrorKind::InvalidAssignment);

    let outcome = run(vec![for_in("k", None, num(3.0), vec![])]);
    assert_eq!(outcome.panic().message, "cannot iterate over non-iterable object");
}

#[test]
fn test_huge_string_repetition_is_a_script_panic() {
    let outcome = run(vec![expr(binary(string("ab"), BinaryOp::Mul, num(1e19)))]);
    let panic = outcome.panic();
    assert_eq!(panic.kind, ErrorKind::RuntimeError);
    assert_eq!(panic.message, "string repetition is too large");
}

#[test]
fn test_error_values_are_inert() {
    let outcome = run(vec![
        var("e", call(dot(ident("errors"), "format"), vec![string("bad value: $"), num(7.0)])),
        var("is", call(dot(ident("errors"), "is"), vec![ident("e")])),
        var("msg", call(ident("str"), vec![ident("e")])),
    ]);
    assert!(outcome.result.is_ok());
    assert_eq!(outcome.global("is"), Object::Number(1.0));
    assert_eq!(outcome.global("msg"), Object::from("bad value: 7"));
}

#[test]
fn test_errors_panic_aborts_run() {
    let outcome = run(vec![
        expr(call(dot(ident("errors"), "panic"), vec![string("stop here")])),
        var("after", num(1.0)),
    ]);
    assert_eq!(outcome.panic().message, "stop here");
    assert!(outcome.env.get("after").is_none());
}

#[test]
fn test_io_output_is_captured() {
    let outcome = run(vec![
        expr(call(dot(ident("io"), "println"), vec![string("hi"), num(1.0)])),
        expr(call(dot(ident("io"), "printf"), vec![string("$-$"), string("a"), string("b")])),
    ]);
    assert!(outcome.result.is_ok());
    assert_eq!(outcome.output(), "hi 1\na-b");
}

#[test]
fn test_timers_fire_in_time_order() {
    let start = Instant::now();
    let outcome = run(vec![
        var("order", string("")),
        expr(call(
            dot(ident("events"), "after"),
            vec![func(&[], vec![expr(assign(ident("order"), add(ident("order"), string("b"))))]), num(30.0)],
        )),
        expr(call(
            dot(ident("events"), "after"),
            vec![func(&[], vec![expr(assign(ident("order"), add(ident("order"), string("a"))))]), num(5.0)],
        )),
    ]);
    assert!(outcome.result.is_ok());
    assert_eq!(outcome.global("order"), Object::from("ab"));
    assert!(start.elapsed() >= Duration::from_millis(30));
}

#[test]
fn test_cancelled_timer_never_runs() {
    let outcome = run(vec![
        var("ran", num(0.0)),
        var(
            "cancel",
            call(
                dot(ident("events"), "after"),
                vec![func(&[], vec![expr(assign(ident("ran"), num(1.0)))]), num(100.0)],
            ),
        ),
        expr(call(ident("cancel"), vec![])),
    ]);
    assert!(outcome.result.is_ok());
    assert_eq!(outcome.global("ran"), Object::Number(0.0));
}

#[test]
fn test_registered_handler_receives_event_and_payload() {
    // The handler unregisters itself so the loop can finish.
    let outcome = run(vec![
        var("got", string("")),
        var("off", nil()),
        expr(assign(
            ident("off"),
            call(
                dot(ident("events"), "register"),
                vec![
                    string("greet"),
                    func(
                        &["event", "name"],
                        vec![
                            expr(assign(ident("got"), add(add(ident("event"), string(":")), ident("name")))),
                            expr(call(ident("off"), vec![])),
                        ],
                    ),
                ],
            ),
        )),
        expr(call(dot(ident("events"), "fire"), vec![string("greet"), string("bob")])),
    ]);
    assert!(outcome.result.is_ok());
    assert_eq!(outcome.global("got"), Object::from("greet:bob"));
}

#[test]
fn test_promise_then_after_settlement_fires_once() {
    let outcome = run(vec![
        var("seen", num(0.0)),
        var("value", nil()),
        var(
            "p",
            call(
                dot(ident("events"), "promise"),
                vec![func(&["resolve", "reject"], vec![
                    expr(call(ident("resolve"), vec![num(5.0)])),
                    expr(call(ident("resolve"), vec![num(6.0)])),
                ])],
            ),
        ),
        expr(method(
            ident("p"),
            "then",
            vec![func(&["v"], vec![increment("seen"), expr(assign(ident("value"), ident("v")))])],
        )),
    ]);
    assert!(outcome.result.is_ok());
    assert_eq!(outcome.global("seen"), Object::Number(1.0));
    assert_eq!(outcome.global("value"), Object::Number(5.0));
}

#[test]
fn test_promise_rejection_reaches_catch_as_error() {
    let outcome = run(vec![
        var("caught", nil()),
        var("done", num(0.0)),
        var(
            "p",
            call(
                dot(ident("events"), "promise"),
                vec![func(&["resolve", "reject"], vec![
                    expr(call(dot(ident("events"), "after"), vec![ident("reject"), num(5.0), string("nope")])),
                ])],
            ),
        ),
        expr(method(
            method(
                ident("p"),
                "catch",
                vec![func(&["e"], vec![expr(assign(ident("caught"), call(ident("type"), vec![ident("e")])))])],
            ),
            "finally",
            vec![func(&[], vec![expr(assign(ident("done"), num(1.0)))])],
        )),
    ]);
    assert!(outcome.result.is_ok());
    assert_eq!(outcome.global("caught"), Object::from("error"));
    assert_eq!(outcome.global("done"), Object::Number(1.0));
}

#[test]
fn test_event_loop_task_panic_is_reported_after_drain() {
    let outcome = run(vec![
        var("later", num(0.0)),
        expr(call(
            dot(ident("events"), "after"),
            vec![func(&[], vec![expr(call(dot(ident("errors"), "panic"), vec![string("late")]))]), num(0.0)],
        )),
        expr(call(
            dot(ident("events"), "after"),
            vec![func(&[], vec![expr(assign(ident("later"), num(1.0)))]), num(10.0)],
        )),
    ]);
    let panic = outcome.panic();
    assert_eq!(panic.kind, ErrorKind::EventLoop);
    assert_eq!(panic.message, "Event loop panic: schedule call failed: late");
    // Sibling tasks still ran.
    assert_eq!(outcome.global("later"), Object::Number(1.0));
}

#[test]
fn test_cancellation_stops_infinite_loop() {
    let token = CancellationToken::new();
    let canceller = token.clone();
    std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(20));
        canceller.cancel();
    });
    let outcome = run_with(Options::new().with_cancellation(token), vec![while_loop(num(1.0), vec![])]);
    let panic = outcome.panic();
    assert_eq!(panic.kind, ErrorKind::Cancelled);
    assert_eq!(panic.message, "context cancelled");
}

#[test]
fn test_disabled_features_are_not_registered() {
    let outcome = run_with(Options::new().disable_events().disable_eval(), vec![
        var("e", call(ident("type"), vec![ident("events")])),
        var("v", call(ident("type"), vec![ident("eval")])),
    ]);
    assert!(outcome.result.is_ok());
    assert_eq!(outcome.global("e"), Object::from("nil"));
    assert_eq!(outcome.global("v"), Object::from("nil"));
}

const SNIPPET: &str = r#"{"statements": [
    {"kind": "var", "name": "q", "value": {"kind": "number", "value": 1}},
    {"kind": "expression", "expr": {"kind": "binary", "op": "+",
        "left": {"kind": "identifier", "name": "q"},
        "right": {"kind": "number", "value": 1}}}
]}"#;

#[test]
fn test_eval_and_refl_run_in_fresh_scopes() {
    let outcome = run(vec![
        var("a", call(ident("eval"), vec![string(SNIPPET)])),
        var("b", call(ident("refl"), vec![string(SNIPPET)])),
        var("leaked", call(ident("type"), vec![ident("q")])),
    ]);
    assert!(outcome.result.is_ok());
    assert_eq!(outcome.global("a"), Object::Number(2.0));
    assert_eq!(outcome.global("b"), Object::Number(2.0));
    assert_eq!(outcome.global("leaked"), Object::from("nil"));
}

#[test]
fn test_eval_failure_is_an_error_value() {
    let outcome = run(vec![
        var("r", call(ident("eval"), vec![string("{ not a program")])),
        var("is", call(dot(ident("errors"), "is"), vec![ident("r")])),
    ]);
    assert!(outcome.result.is_ok());
    assert_eq!(outcome.global("is"), Object::Number(1.0));
}
