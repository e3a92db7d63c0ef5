use cellsync_core::{CellCoord, CellError, CellValue, ClientId, ErrorKind, SheetId};
use cellsync_engine::{CommandResult, SpreadsheetEngine};
use cellsync_history::Command;

fn engine() -> SpreadsheetEngine {
    SpreadsheetEngine::new(ClientId::from("alice")).unwrap()
}

fn sheet1() -> SheetId {
    SheetId::from("sheet1")
}

fn at(a1: &str) -> CellCoord {
    CellCoord::from_a1(a1).unwrap()
}

fn set(engine: &mut SpreadsheetEngine, a1: &str, content: &str) {
    let result = engine
        .dispatch(Command::set_content(sheet1(), at(a1), content))
        .unwrap();
    assert_eq!(result, CommandResult::Success, "setting {a1} to {content}");
}

fn value(engine: &SpreadsheetEngine, a1: &str) -> CellValue {
    engine.get_cell_value(&sheet1(), at(a1))
}

#[test]
fn test_reference_and_cycle() {
    let mut engine = engine();
    set(&mut engine, "A1", "5");
    set(&mut engine, "A2", "=A1+1");
    assert_eq!(value(&engine, "A2"), CellValue::Number(6.0));

    set(&mut engine, "A1", "=A2+1");
    assert_eq!(value(&engine, "A1"), CellValue::Error(CellError::CyclicReference));
    assert_eq!(value(&engine, "A2"), CellValue::Error(CellError::CyclicReference));

    // Breaking the cycle brings both back
    set(&mut engine, "A1", "1");
    assert_eq!(value(&engine, "A1"), CellValue::Number(1.0));
    assert_eq!(value(&engine, "A2"), CellValue::Number(2.0));
}

#[test]
fn test_self_reference() {
    let mut engine = engine();
    set(&mut engine, "C3", "=C3*2");
    assert_eq!(value(&engine, "C3"), CellValue::Error(CellError::CyclicReference));
}

#[test]
fn test_errors_propagate_but_siblings_evaluate() {
    let mut engine = engine();
    set(&mut engine, "A1", "=1/0");
    set(&mut engine, "B1", "=A1+1");
    set(&mut engine, "C1", "=IFERROR(A1, 0)");
    set(&mut engine, "D1", "=2*3");
    set(&mut engine, "E1", "=SUM(");

    assert_eq!(value(&engine, "A1"), CellValue::Error(CellError::DivisionByZero));
    assert_eq!(value(&engine, "B1"), CellValue::Error(CellError::Propagated));
    assert_eq!(value(&engine, "C1"), CellValue::Number(0.0));
    assert_eq!(value(&engine, "D1"), CellValue::Number(6.0));

    let bad = value(&engine, "E1");
    assert_eq!(bad, CellValue::Error(CellError::BadExpression));
    if let CellValue::Error(e) = bad {
        assert_eq!(e.kind(), ErrorKind::BadExpression);
    }
}

#[test]
fn test_empty_cells_coerce() {
    let mut engine = engine();
    set(&mut engine, "A1", "=B9+1");
    set(&mut engine, "A2", "=B9&\"x\"");
    assert_eq!(value(&engine, "A1"), CellValue::Number(1.0));
    assert_eq!(value(&engine, "A2"), CellValue::Text("x".to_string()));
}

#[test]
fn test_content_sniffing() {
    let mut engine = engine();
    set(&mut engine, "A1", "1,000");
    set(&mut engine, "A2", "50%");
    set(&mut engine, "A3", "$5");
    set(&mut engine, "A4", "true");
    set(&mut engine, "A5", "=A1+A2");

    assert_eq!(value(&engine, "A1"), CellValue::Number(1000.0));
    assert_eq!(value(&engine, "A2"), CellValue::Number(0.5));
    assert_eq!(value(&engine, "A3"), CellValue::Text("$5".to_string()));
    assert_eq!(value(&engine, "A4"), CellValue::Boolean(true));
    assert_eq!(engine.get_cell_display_text(&sheet1(), at("A5")), "1000.5");
    assert_eq!(engine.get_cell(&sheet1(), at("A1")).map(|c| c.raw.as_str()), Some("1,000"));
}

#[test]
fn test_ranges_and_functions() {
    let mut engine = engine();
    for (i, n) in [4, 8, 15, 16, 23].iter().enumerate() {
        set(&mut engine, &format!("A{}", i + 1), &n.to_string());
    }
    set(&mut engine, "B1", "=SUM(A1:A5)");
    set(&mut engine, "B2", "=AVERAGE(A1:A5)");
    set(&mut engine, "B3", "=IF(B1>50, \"big\", \"small\")");
    set(&mut engine, "B4", "=CONCAT(UPPER(\"n\"), LEN(\"four\"))");

    assert_eq!(value(&engine, "B1"), CellValue::Number(66.0));
    assert_eq!(value(&engine, "B2"), CellValue::Number(13.2));
    assert_eq!(value(&engine, "B3"), CellValue::Text("big".to_string()));
    assert_eq!(value(&engine, "B4"), CellValue::Text("N4".to_string()));

    // Range members drive recomputation
    set(&mut engine, "A3", "0");
    assert_eq!(value(&engine, "B1"), CellValue::Number(51.0));
    assert_eq!(value(&engine, "B3"), CellValue::Text("big".to_string()));
}

#[test]
fn test_range_past_the_grid() {
    let mut engine = engine();
    set(&mut engine, "B1", "4");
    set(&mut engine, "A1", "=SUM(B1:ZZZ999999)");
    set(&mut engine, "A2", "=SUM(B1:B100)");
    assert_eq!(value(&engine, "A1"), CellValue::Error(CellError::InvalidReference));
    assert_eq!(engine.get_cell_display_text(&sheet1(), at("A1")), "#REF!");
    assert_eq!(value(&engine, "A2"), CellValue::Number(4.0));
}

#[test]
fn test_cross_sheet_references() {
    let mut engine = engine();
    let data = SheetId::from("data");
    engine
        .dispatch(Command::CreateSheet {
            sheet: data.clone(),
            name: "Data".to_string(),
        })
        .unwrap();
    engine
        .dispatch(Command::set_content(data.clone(), at("A1"), "7"))
        .unwrap();
    set(&mut engine, "A1", "=Data!A1*2");
    assert_eq!(value(&engine, "A1"), CellValue::Number(14.0));

    engine
        .dispatch(Command::set_content(data.clone(), at("A1"), "8"))
        .unwrap();
    assert_eq!(value(&engine, "A1"), CellValue::Number(16.0));

    engine.dispatch(Command::DeleteSheet { sheet: data }).unwrap();
    assert_eq!(value(&engine, "A1"), CellValue::Error(CellError::InvalidReference));

    engine.dispatch(Command::Undo).unwrap();
    assert_eq!(value(&engine, "A1"), CellValue::Number(16.0));
}

#[test]
fn test_repeated_evaluation_is_stable() {
    let mut engine = engine();
    set(&mut engine, "A1", "3");
    set(&mut engine, "A2", "=A1^2");
    set(&mut engine, "A3", "=A2-A1");
    set(&mut engine, "A4", "=ROUND(A3/7, 2)");
    let before: Vec<CellValue> = ["A2", "A3", "A4"].iter().map(|a| value(&engine, a)).collect();

    // Rewriting the same content recomputes without changing anything
    set(&mut engine, "A1", "3");
    let after: Vec<CellValue> = ["A2", "A3", "A4"].iter().map(|a| value(&engine, a)).collect();
    assert_eq!(before, after);
    assert_eq!(after[2], CellValue::Number(0.86));
}

#[test]
fn test_dependents_query() {
    let mut engine = engine();
    set(&mut engine, "A1", "1");
    set(&mut engine, "B1", "=A1");
    set(&mut engine, "C1", "=B1+SUM(A1:A2)");
    set(&mut engine, "D1", "=C1");

    let direct = engine.get_dependents(&sheet1(), at("A1"), false);
    assert_eq!(direct.len(), 2);
    let all = engine.get_dependents(&sheet1(), at("A1"), true);
    assert_eq!(all.len(), 3);
}
