use super::*;
use crate::{
    backend::sink::DataKind,
    frontend::{
        Position,
        ast::{
            AssignOperator, BinaryOperator, Expression, ForDirection, RoutineDeclaration,
            Statement, VarDeclaration, VarUnit,
        },
        intern::Name,
    },
    middle::{
        symbols::ParameterDeclaration,
        ty::{Bounds, TypeId},
    },
};

const P: Position = Position::new(1, 1);

fn program(parts: Vec<Statement>) -> Program {
    Program {
        name: Name::new("test"),
        parts,
    }
}

fn block(statements: Vec<Statement>) -> Statement {
    Statement::new(StatementKind::Block(statements), P)
}

fn expression(expression: Expression) -> Statement {
    Statement::new(StatementKind::Expression(expression), P)
}

fn var(symbols: Vec<SymbolId>, initializer: Option<Expression>) -> Statement {
    Statement::new(
        StatementKind::Var(VarDeclaration {
            units: vec![VarUnit {
                position: P,
                variables: symbols,
                initializer,
            }],
        }),
        P,
    )
}

fn routine(symbol: SymbolId, parts: Vec<Statement>) -> Statement {
    Statement::new(
        StatementKind::Routine(RoutineDeclaration { symbol, parts }),
        P,
    )
}

fn predefined(registry: &Registry, name: &str, arguments: Vec<Expression>) -> Expression {
    Expression::call(registry.lookup(name).unwrap(), arguments, P)
}

fn assign(target: Expression, value: Expression) -> Expression {
    Expression::assign(AssignOperator::Assign, target, value, P)
}

fn int(value: i64) -> Expression {
    Expression::integer(value, P)
}

fn text(program: &Program, registry: &Registry) -> Vec<String> {
    generate_program(program, registry, &CodegenOptions::default())
        .unwrap()
        .text
        .iter()
        .map(ToString::to_string)
        .collect()
}

fn position_of(lines: &[String], line: &str) -> usize {
    lines
        .iter()
        .position(|l| l == line)
        .unwrap_or_else(|| panic!("{line:?} not found in {lines:#?}"))
}

#[test]
fn break_and_continue_target_the_innermost_loop() {
    let registry = Registry::new();
    let inner = Statement::new(
        StatementKind::While {
            condition: int(1),
            body: Box::new(block(vec![
                Statement::new(StatementKind::Break, P),
                Statement::new(StatementKind::Continue, P),
            ])),
        },
        P,
    );
    let outer = Statement::new(
        StatementKind::While {
            condition: int(1),
            body: Box::new(block(vec![inner, Statement::new(StatementKind::Break, P)])),
        },
        P,
    );

    let lines = text(&program(vec![block(vec![outer])]), &registry);
    let start = position_of(&lines, ".L2:");

    assert_eq!(
        lines[start..start + 12],
        [
            ".L2:",
            "    pushq $1",
            "    popq %rax",
            "    testq %rax, %rax",
            "    jz .L3",
            "    jmp .L3",
            "    jmp .L2",
            "    jmp .L2",
            ".L3:",
            "    jmp .L1",
            "    jmp .L0",
            ".L1:",
        ]
    );
}

#[test]
fn continue_in_repeat_checks_the_condition() {
    let registry = Registry::new();
    let repeat = Statement::new(
        StatementKind::Repeat {
            body: vec![Statement::new(StatementKind::Continue, P)],
            condition: int(1),
        },
        P,
    );

    let lines = text(&program(vec![block(vec![repeat])]), &registry);
    let start = position_of(&lines, ".L0:");

    assert_eq!(
        lines[start..start + 8],
        [
            ".L0:",
            "    jmp .L1",
            ".L1:",
            "    pushq $1",
            "    popq %rax",
            "    testq %rax, %rax",
            "    jz .L0",
            ".L2:",
        ]
    );
}

#[test]
fn break_outside_of_a_loop_is_internal() {
    let registry = Registry::new();
    let program = program(vec![block(vec![Statement::new(StatementKind::Break, P)])]);

    let error = generate_program(&program, &registry, &CodegenOptions::default()).unwrap_err();
    assert!(error.is_internal());
}

#[test]
fn empty_for_range_skips_the_body() {
    let mut registry = Registry::new();
    let i = registry.declare_global("i", TypeId::INTEGER, P).unwrap();

    let for_loop = Statement::new(
        StatementKind::For {
            variable: Expression::variable(i, P),
            low: int(5),
            high: int(1),
            direction: ForDirection::Ascending,
            body: Box::new(expression(predefined(
                &registry,
                "WRITE",
                vec![Expression::variable(i, P)],
            ))),
        },
        P,
    );

    let lines = text(&program(vec![var(vec![i], None), block(vec![for_loop])]), &registry);
    let start = position_of(&lines, "    pushq $5");

    assert_eq!(
        lines[start..start + 11],
        [
            "    pushq $5",
            "    leaq _I(%rip), %rax",
            "    pushq %rax",
            "    pushq $1",
            "    popq %rdx",
            "    popq %rcx",
            "    popq (%rcx)",
            "    movq (%rcx), %rcx",
            "    cmpq %rcx, %rdx",
            "    jl .L2",
            ".L0:",
        ]
    );

    let check = position_of(&lines, ".L1:");
    assert_eq!(
        lines[check..check + 12],
        [
            ".L1:",
            "    pushq $1",
            "    pushq _I(%rip)",
            "    popq %rdx",
            "    popq %rcx",
            "    cmpq %rdx, %rcx",
            "    jle .L2",
            "    leaq _I(%rip), %rax",
            "    pushq %rax",
            "    popq %rax",
            "    addq $1, (%rax)",
            "    jmp .L0",
        ]
    );
    assert_eq!(lines[check + 12], ".L2:");

    // main only saves %rbx, loops must stay in caller-saved registers
    for preserved in ["%r12", "%r13", "%r14", "%r15"] {
        assert!(!lines.iter().any(|l| l.contains(preserved)));
    }
}

#[test]
fn descending_for_counts_down() {
    let mut registry = Registry::new();
    let i = registry.declare_global("i", TypeId::INTEGER, P).unwrap();

    let for_loop = Statement::new(
        StatementKind::For {
            variable: Expression::variable(i, P),
            low: int(10),
            high: int(1),
            direction: ForDirection::Descending,
            body: Box::new(block(vec![])),
        },
        P,
    );

    let lines = text(&program(vec![block(vec![for_loop])]), &registry);

    assert!(lines.contains(&"    jg .L2".to_owned()));
    assert!(lines.contains(&"    jge .L2".to_owned()));
    assert!(lines.contains(&"    subq $1, (%rax)".to_owned()));
}

#[test]
fn element_address_uses_row_major_strides() {
    let mut registry = Registry::new();
    let cube_ty = registry.types().array(
        TypeId::INTEGER,
        [Bounds::new(1, 2), Bounds::new(0, 2), Bounds::new(5, 8)],
    );
    let cube = registry.declare_global("cube", cube_ty, P).unwrap();
    let i = registry.declare_global("i", TypeId::INTEGER, P).unwrap();

    let access = Expression::array_access(
        Expression::variable(cube, P),
        vec![
            Expression::variable(i, P),
            Expression::variable(i, P),
            Expression::variable(i, P),
        ],
        P,
    );
    let statement = expression(assign(access, int(0)));

    let lines = text(&program(vec![block(vec![statement])]), &registry);
    let start = position_of(&lines, "    leaq _CUBE(%rip), %rax");

    assert_eq!(
        lines[start..start + 27],
        [
            "    leaq _CUBE(%rip), %rax",
            "    pushq %rax",
            "    pushq $0",
            "    pushq _I(%rip)",
            "    popq %rax",
            "    subq $1, %rax",
            "    imulq $12, %rax",
            "    addq %rax, (%rsp)",
            "    pushq _I(%rip)",
            "    popq %rax",
            "    imulq $4, %rax",
            "    addq %rax, (%rsp)",
            "    pushq _I(%rip)",
            "    popq %rax",
            "    subq $5, %rax",
            "    addq %rax, (%rsp)",
            "    popq %rax",
            "    imulq $8, %rax",
            "    popq %rcx",
            "    leaq (%rcx,%rax,1), %rax",
            "    pushq %rax",
            "    popq %rax",
            "    popq %rcx",
            "    movq %rcx, (%rax)",
            "    movq -8(%rbp), %rbx",
            "    movq %rbp, %rsp",
            "    popq %rbp",
        ]
    );
}

#[test]
fn global_initializers_run_before_the_first_block() {
    let mut registry = Registry::new();
    let x = registry.declare_global("x", TypeId::INTEGER, P).unwrap();
    let p = registry.declare_procedure("p", &[], P).unwrap();

    let parts = vec![
        var(vec![x], Some(int(42))),
        routine(p, vec![block(vec![expression(predefined(&registry, "WRITELN", vec![]))])]),
        block(vec![expression(predefined(
            &registry,
            "WRITE",
            vec![Expression::variable(x, P)],
        ))]),
    ];

    let lines = text(&program(parts), &registry);

    let main = position_of(&lines, "main:");
    let initializer = position_of(&lines, "    pushq $42");
    let body = position_of(&lines, "    pushq _X(%rip)");
    let main_return = position_of(&lines, "    ret");
    let routine = position_of(&lines, "_P:");

    assert!(main < initializer);
    assert!(initializer < body);
    assert!(body < main_return);
    assert!(main_return < routine);
    assert_eq!(lines.last().map(String::as_str), Some("    ret"));
}

#[test]
fn nested_routines_follow_the_enclosing_epilogue() {
    let mut registry = Registry::new();
    let outer = registry.declare_procedure("outer", &[], P).unwrap();
    let inner = registry.declare_procedure("inner", &[], P).unwrap();
    let forward = registry.declare_procedure("later", &[], P).unwrap();

    let parts = vec![
        routine(forward, vec![]),
        routine(
            outer,
            vec![
                routine(inner, vec![block(vec![])]),
                block(vec![expression(Expression::call(inner, vec![], P))]),
            ],
        ),
        block(vec![expression(Expression::call(outer, vec![], P))]),
    ];

    let lines = text(&program(parts), &registry);
    let outer_start = position_of(&lines, "_OUTER:");

    assert_eq!(
        lines[outer_start..],
        [
            "_OUTER:",
            "    pushq %rbp",
            "    movq %rsp, %rbp",
            "    call _INNER",
            "    movq %rbp, %rsp",
            "    popq %rbp",
            "    ret",
            "_INNER:",
            "    pushq %rbp",
            "    movq %rsp, %rbp",
            "    movq %rbp, %rsp",
            "    popq %rbp",
            "    ret",
        ]
    );
    assert!(!lines.contains(&"_LATER:".to_owned()));
}

#[test]
fn exit_stores_the_result_slot() {
    let mut registry = Registry::new();
    let f = registry
        .declare_function("f", &[], TypeId::INTEGER, P)
        .unwrap();
    let exit = registry.lookup("EXIT").unwrap();

    let parts = vec![
        routine(
            f,
            vec![block(vec![expression(Expression::call(exit, vec![int(7)], P))])],
        ),
        block(vec![expression(predefined(
            &registry,
            "WRITE",
            vec![Expression::call(f, vec![], P)],
        ))]),
    ];

    let lines = text(&program(parts), &registry);

    let call = position_of(&lines, "    call _F");
    assert_eq!(lines[call - 1], "    subq $8, %rsp");
    assert_eq!(lines[call + 1], "    popq %rax");
    assert_eq!(lines[call + 2], "    pushq %rax");

    let start = position_of(&lines, "_F:");
    assert_eq!(
        lines[start..],
        [
            "_F:",
            "    pushq %rbp",
            "    movq %rsp, %rbp",
            "    pushq $7",
            "    popq %rax",
            "    movq %rax, 16(%rbp)",
            "    movq %rbp, %rsp",
            "    popq %rbp",
            "    ret",
            "    movq %rbp, %rsp",
            "    popq %rbp",
            "    ret",
        ]
    );
}

#[test]
fn exit_in_the_main_program_returns_zero() {
    let registry = Registry::new();
    let exit = predefined(&registry, "EXIT", vec![]);

    let lines = text(&program(vec![block(vec![expression(exit)])]), &registry);

    let returns = lines.iter().filter(|l| *l == "    xorq %rax, %rax").count();
    assert_eq!(returns, 2);
}

#[test]
fn arguments_are_pushed_last_to_first() {
    let mut registry = Registry::new();
    let i = registry.declare_global("i", TypeId::INTEGER, P).unwrap();
    let swap = registry
        .declare_procedure(
            "swap",
            &[
                ParameterDeclaration::reference("a", TypeId::INTEGER),
                ParameterDeclaration::value("b", TypeId::FLOAT),
            ],
            P,
        )
        .unwrap();

    let call = Expression::call(swap, vec![Expression::variable(i, P), int(2)], P);
    let lines = text(&program(vec![block(vec![expression(call)])]), &registry);
    let start = position_of(&lines, "    pushq $2");

    assert_eq!(
        lines[start..start + 9],
        [
            "    pushq $2",
            "    popq %rax",
            "    cvtsi2sdq %rax, %xmm0",
            "    movq %xmm0, %rax",
            "    pushq %rax",
            "    leaq _I(%rip), %rax",
            "    pushq %rax",
            "    call _SWAP",
            "    addq $16, %rsp",
        ]
    );
}

#[test]
fn parameters_are_read_through_the_frame() {
    let mut registry = Registry::new();
    let bump = registry
        .declare_function(
            "bump",
            &[
                ParameterDeclaration::reference("a", TypeId::INTEGER),
                ParameterDeclaration::value("b", TypeId::INTEGER),
            ],
            TypeId::INTEGER,
            P,
        )
        .unwrap();
    let locals = registry.routine(bump).unwrap().locals.clone();
    let a = locals.lookup(Name::new("a")).unwrap();
    let b = locals.lookup(Name::new("b")).unwrap();
    let result = registry.routine(bump).unwrap().result.unwrap();
    let t = registry.declare_local(bump, "t", TypeId::INTEGER, P).unwrap();

    let body = block(vec![
        expression(assign(Expression::variable(t, P), Expression::variable(b, P))),
        expression(assign(
            Expression::variable(result, P),
            Expression::variable(a, P),
        )),
    ]);
    let lines = text(&program(vec![routine(bump, vec![body])]), &registry);
    let start = position_of(&lines, "_BUMP:");

    assert_eq!(
        lines[start..start + 20],
        [
            "_BUMP:",
            "    pushq %rbp",
            "    movq %rsp, %rbp",
            "    subq $8, %rsp",
            "    pushq 32(%rbp)",
            "    leaq -8(%rbp), %rax",
            "    pushq %rax",
            "    popq %rax",
            "    popq %rcx",
            "    movq %rcx, (%rax)",
            "    pushq 24(%rbp)",
            "    popq %rax",
            "    pushq (%rax)",
            "    leaq 16(%rbp), %rax",
            "    pushq %rax",
            "    popq %rax",
            "    popq %rcx",
            "    movq %rcx, (%rax)",
            "    movq %rbp, %rsp",
            "    popq %rbp",
        ]
    );
}

#[test]
fn comparisons_pick_integer_or_float_flags() {
    let mut registry = Registry::new();
    let x = registry.declare_global("x", TypeId::FLOAT, P).unwrap();

    let integer = Expression::binary(BinaryOperator::Less, int(1), int(2), P);
    let float = Expression::binary(BinaryOperator::Less, Expression::variable(x, P), int(2), P);

    let lines = text(
        &program(vec![block(vec![expression(integer), expression(float)])]),
        &registry,
    );

    let set_less = position_of(&lines, "    setl %al");
    assert_eq!(lines[set_less - 1], "    cmpq %r11, %rdx");

    let set_below = position_of(&lines, "    setb %al");
    assert_eq!(lines[set_below - 1], "    comisd %xmm1, %xmm0");

    // both values are discarded
    let discards = lines.iter().filter(|l| *l == "    addq $8, %rsp").count();
    assert_eq!(discards, 2);
}

#[test]
fn short_circuit_and() {
    let registry = Registry::new();
    let and = Expression::binary(BinaryOperator::And, int(0), int(1), P);

    let lines = text(&program(vec![block(vec![expression(and)])]), &registry);
    let start = position_of(&lines, "    pushq $0");

    assert_eq!(
        lines[start..start + 14],
        [
            "    pushq $0",
            "    popq %rax",
            "    testq %rax, %rax",
            "    jz .L0",
            "    pushq $1",
            "    popq %rax",
            "    testq %rax, %rax",
            "    jz .L0",
            "    pushq $1",
            "    jmp .L1",
            ".L0:",
            "    pushq $0",
            ".L1:",
            "    addq $8, %rsp",
        ]
    );
}

#[test]
fn compound_assignment_converts_back_to_the_target() {
    let mut registry = Registry::new();
    let i = registry.declare_global("i", TypeId::INTEGER, P).unwrap();

    let halve = Expression::assign(
        AssignOperator::Divide,
        Expression::variable(i, P),
        int(2),
        P,
    );
    let lines = text(&program(vec![block(vec![expression(halve)])]), &registry);

    let divide = position_of(&lines, "    divsd %xmm1, %xmm0");
    let truncate = position_of(&lines, "    cvttsd2siq %xmm0, %rax");
    let store = position_of(&lines, "    movq %rcx, (%rax)");

    assert!(divide < truncate);
    assert!(truncate < store);
}

#[test]
fn compound_assignment_reuses_the_target_address() {
    let mut registry = Registry::new();
    let i = registry.declare_global("i", TypeId::INTEGER, P).unwrap();

    let bump = Expression::assign(AssignOperator::Add, Expression::variable(i, P), int(1), P);
    let lines = text(&program(vec![block(vec![expression(bump)])]), &registry);
    let start = position_of(&lines, "    leaq _I(%rip), %rax");

    assert_eq!(
        lines[start..start + 13],
        [
            "    leaq _I(%rip), %rax",
            "    pushq %rax",
            "    pushq (%rsp)",
            "    popq %rax",
            "    pushq (%rax)",
            "    pushq $1",
            "    popq %r10",
            "    popq %rax",
            "    addq %r10, %rax",
            "    pushq %rax",
            "    popq %rcx",
            "    popq %rax",
            "    movq %rcx, (%rax)",
        ]
    );
}

#[test]
fn compound_assignment_evaluates_the_index_once() {
    let mut registry = Registry::new();
    let row = registry
        .types()
        .array(TypeId::INTEGER, [Bounds::new(1, 3)]);
    let a = registry.declare_global("a", row, P).unwrap();
    let f = registry
        .declare_function("f", &[], TypeId::INTEGER, P)
        .unwrap();

    let element = Expression::array_access(
        Expression::variable(a, P),
        vec![Expression::call(f, vec![], P)],
        P,
    );
    let add = Expression::assign(AssignOperator::Add, element, int(5), P);

    let lines = text(
        &program(vec![var(vec![a], None), block(vec![expression(add)])]),
        &registry,
    );

    let calls = lines.iter().filter(|l| *l == "    call _F").count();
    assert_eq!(calls, 1);

    let load = position_of(&lines, "    pushq (%rsp)");
    assert!(position_of(&lines, "    call _F") < load);
    assert_eq!(lines[load - 1], "    pushq %rax");
    assert_eq!(lines[load - 2], "    leaq (%rcx,%rax,1), %rax");
}

#[test]
fn string_literals_are_emitted_once() {
    let registry = Registry::new();
    let greeting = Expression::string("hello", P);
    let program = program(vec![block(vec![expression(predefined(
        &registry,
        "WRITELN",
        vec![greeting],
    ))])]);

    let first = generate_program(&program, &registry, &CodegenOptions::default()).unwrap();
    let second = generate_program(&program, &registry, &CodegenOptions::default()).unwrap();

    for listing in [&first, &second] {
        let strings = listing
            .data
            .iter()
            .filter(|item| item.kind == DataKind::Asciz("hello".to_owned()))
            .count();
        assert_eq!(strings, 1);
    }

    assert_eq!(first.to_string(), second.to_string());
}

#[test]
fn records_and_aggregates() {
    let mut registry = Registry::new();
    let point = registry
        .record_type(&[("x", TypeId::FLOAT), ("y", TypeId::FLOAT)], P)
        .unwrap();
    let a = registry.declare_global("a", point, P).unwrap();
    let b = registry.declare_global("b", point, P).unwrap();

    let copy = assign(Expression::variable(a, P), Expression::variable(b, P));
    let field = assign(
        Expression::record_access(Expression::variable(a, P), "y", P),
        Expression::float(0.5, P),
    );

    let lines = text(
        &program(vec![
            var(vec![a, b], None),
            block(vec![expression(copy), expression(field)]),
        ]),
        &registry,
    );

    let copy_start = position_of(&lines, "    leaq _B(%rip), %rax");
    assert_eq!(
        lines[copy_start..copy_start + 8],
        [
            "    leaq _B(%rip), %rax",
            "    pushq %rax",
            "    leaq _A(%rip), %rax",
            "    pushq %rax",
            "    popq %rdi",
            "    popq %rsi",
            "    movq $16, %rcx",
            "    rep movsb",
        ]
    );
    assert!(lines.contains(&"    leaq 8(%rax), %rax".to_owned()));
}

#[test]
fn comments_are_optional() {
    let registry = Registry::new();
    let looping = Statement::new(
        StatementKind::While {
            condition: int(0),
            body: Box::new(block(vec![])),
        },
        Position::new(3, 5),
    );
    let program = program(vec![block(vec![looping])]);

    let options = CodegenOptions {
        emit_comments: true,
        ..CodegenOptions::default()
    };
    let listing = generate_program(&program, &registry, &options).unwrap();

    assert!(listing.to_string().contains("    # while at 3:5"));
    assert!(!text(&program, &registry).iter().any(|l| l.contains('#')));
}
