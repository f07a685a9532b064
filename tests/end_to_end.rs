use indoc::indoc;
use pascore::{
    backend::{CodegenOptions, generate_program},
    error::SemanticErrorKind,
    frontend::{
        Position,
        ast::{
            AssignOperator, BinaryOperator, Expression, ExpressionKind, Program, Statement,
            StatementKind, VarDeclaration, VarUnit,
        },
        intern::Name,
    },
    middle::{symbols::Registry, ty::TypeId},
};

fn at(line: u32) -> Position {
    Position::new(line, 1)
}

/// Resolves every expression statement the way the binder would before
/// handing the tree to the backend
fn check(program: &Program, registry: &Registry) -> pascore::error::Result<()> {
    for part in &program.parts {
        match &part.kind {
            StatementKind::Expression(expression) => {
                expression.resolve_type(registry)?;

                if matches!(expression.kind, ExpressionKind::Call(_)) {
                    expression.check_call_arguments(registry, None)?;
                }
            }
            StatementKind::Var(declaration) => declaration.check(registry)?,
            _ => {}
        }
    }

    Ok(())
}

#[test]
fn sum_is_stored_and_printed() {
    let mut registry = Registry::new();
    let x = registry.declare_global("x", TypeId::INTEGER, at(1)).unwrap();
    let write = registry.lookup("write").unwrap();

    let program = Program {
        name: Name::new("sum"),
        parts: vec![
            Statement::new(
                StatementKind::Var(VarDeclaration {
                    units: vec![VarUnit {
                        position: at(1),
                        variables: vec![x],
                        initializer: None,
                    }],
                }),
                at(1),
            ),
            Statement::new(
                StatementKind::Expression(Expression::assign(
                    AssignOperator::Assign,
                    Expression::variable(x, at(2)),
                    Expression::binary(
                        BinaryOperator::Add,
                        Expression::integer(3, at(2)),
                        Expression::integer(4, at(2)),
                        at(2),
                    ),
                    at(2),
                )),
                at(2),
            ),
            Statement::new(
                StatementKind::Expression(Expression::call(
                    write,
                    vec![Expression::variable(x, at(3))],
                    at(3),
                )),
                at(3),
            ),
        ],
    };

    check(&program, &registry).unwrap();
    let listing = generate_program(&program, &registry, &CodegenOptions::default()).unwrap();

    assert_eq!(
        listing.to_string(),
        indoc! {r#"
                .data
            fmt_integer:
                .asciz "%lld"
            fmt_float:
                .asciz "%lf"
            fmt_char:
                .asciz "%c"
            fmt_string:
                .asciz "%s"
            fmt_newline:
                .asciz "\n"
                .balign 8
            _X:
                .zero 8
                .text
                .globl main
            main:
                pushq %rbp
                movq %rsp, %rbp
                pushq %rbx
                pushq $3
                pushq $4
                popq %r10
                popq %rax
                addq %r10, %rax
                pushq %rax
                leaq _X(%rip), %rax
                pushq %rax
                popq %rax
                popq %rcx
                movq %rcx, (%rax)
                pushq _X(%rip)
                popq %rsi
                leaq fmt_integer(%rip), %rdi
                xorq %rax, %rax
                movq %rsp, %rbx
                andq $-16, %rsp
                call printf
                movq %rbx, %rsp
                movq -8(%rbp), %rbx
                movq %rbp, %rsp
                popq %rbp
                xorq %rax, %rax
                ret
        "#}
    );
}

#[test]
fn type_errors_are_reported_before_generation() {
    let mut registry = Registry::new();
    let x = registry.declare_global("x", TypeId::INTEGER, at(1)).unwrap();

    let program = Program {
        name: Name::new("broken"),
        parts: vec![Statement::new(
            StatementKind::Expression(Expression::assign(
                AssignOperator::Assign,
                Expression::variable(x, Position::new(2, 3)),
                Expression::string("text", Position::new(2, 8)),
                Position::new(2, 5),
            )),
            at(2),
        )],
    };

    let error = check(&program, &registry).unwrap_err();

    assert_eq!(
        error.kind(),
        Some(&SemanticErrorKind::IncompatibleTypes {
            expected: "INTEGER".to_owned(),
            actual: "STRING".to_owned(),
        })
    );
    assert_eq!(
        error.to_string(),
        "2:5: incompatible types: got \"STRING\", expected \"INTEGER\""
    );
}

#[test]
fn listing_symbols_follow_the_options() {
    let mut registry = Registry::new();
    let total = registry.declare_global("total", TypeId::FLOAT, at(1)).unwrap();
    let writeln = registry.lookup("WRITELN").unwrap();

    let program = Program {
        name: Name::new("options"),
        parts: vec![Statement::new(
            StatementKind::Expression(Expression::call(
                writeln,
                vec![Expression::variable(total, at(2))],
                at(2),
            )),
            at(2),
        )],
    };

    let options = CodegenOptions {
        entry_symbol: "_main".to_owned(),
        printf_symbol: "_printf".to_owned(),
        symbol_prefix: "v_".to_owned(),
        ..CodegenOptions::default()
    };
    let listing = generate_program(&program, &registry, &options)
        .unwrap()
        .to_string();

    assert!(listing.contains("    .globl _main\n_main:\n"));
    assert!(listing.contains("    pushq v_TOTAL(%rip)\n    popq %rax\n    movq %rax, %xmm0\n"));
    assert!(listing.contains("    movq $1, %rax\n"));
    assert_eq!(listing.matches("    call _printf\n").count(), 2);
}
