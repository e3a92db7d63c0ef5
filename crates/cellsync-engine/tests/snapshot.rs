use cellsync_core::{
    Axis, CellCoord, CellError, CellFormat, CellRange, CellValue, ClientId, Color, SheetId,
};
use cellsync_engine::{EngineConfig, SpreadsheetEngine};
use cellsync_history::Command;

fn sheet1() -> SheetId {
    SheetId::from("sheet1")
}

fn at(a1: &str) -> CellCoord {
    CellCoord::from_a1(a1).unwrap()
}

fn populated() -> SpreadsheetEngine {
    let mut engine = SpreadsheetEngine::new(ClientId::from("alice")).unwrap();
    for (a1, content) in [("A1", "4"), ("A2", "=A1*A1"), ("A3", "hello"), ("B1", "=A2/0")] {
        engine
            .dispatch(Command::set_content(sheet1(), at(a1), content))
            .unwrap();
    }
    engine
        .dispatch(Command::SetCellStyle {
            sheet: sheet1(),
            range: CellRange::from_a1("A1:A2").unwrap(),
            style: Some(CellFormat {
                italic: true,
                text_color: Some(Color::RED),
                ..Default::default()
            }),
        })
        .unwrap();
    engine
        .dispatch(Command::ResizeColumns {
            sheet: sheet1(),
            cols: vec![0],
            size: 150.0,
        })
        .unwrap();
    engine
}

#[test]
fn test_json_round_trip_reproduces_document() {
    let engine = populated();
    let json = engine.to_json().unwrap();

    let loaded = SpreadsheetEngine::from_json(ClientId::from("bob"), EngineConfig::default(), &json).unwrap();
    assert_eq!(loaded.to_snapshot(), engine.to_snapshot());
    assert_eq!(loaded.get_cell_value(&sheet1(), at("A2")), CellValue::Number(16.0));
    assert_eq!(
        loaded.get_cell_value(&sheet1(), at("B1")),
        CellValue::Error(CellError::DivisionByZero)
    );
    assert_eq!(loaded.get_cell_display_text(&sheet1(), at("A3")), "hello");

    let style = loaded.get_cell(&sheet1(), at("A2")).and_then(|cell| cell.style).unwrap();
    let format = loaded.workbook().styles.get(style).unwrap();
    assert!(format.italic);
    assert_eq!(format.text_color, Some(Color::RED));
    assert_eq!(loaded.workbook().sheet(&sheet1()).unwrap().size(Axis::Column, 0), 150.0);
}

#[test]
fn test_snapshot_keeps_formula_text() {
    let engine = populated();
    let value: serde_json::Value = serde_json::from_str(&engine.to_json().unwrap()).unwrap();
    let text = value.to_string();
    assert!(text.contains("=A1*A1"));
    assert!(text.contains("=A2/0"));
}

#[test]
fn test_load_clears_history() {
    let mut engine = populated();
    assert!(engine.can_undo());
    let json = populated().to_json().unwrap();

    let mut updates = engine.subscribe();
    engine.load_json(&json).unwrap();
    assert!(!engine.can_undo());
    assert!(engine.log().is_empty());
    assert_eq!(engine.last_revision(), None);

    let update = updates.try_recv().unwrap();
    assert_eq!(update.command, "Load");
    assert_eq!(update.changed.len(), 4);
}

#[test]
fn test_cycle_is_derived_again_on_load() {
    let mut engine = SpreadsheetEngine::new(ClientId::from("alice")).unwrap();
    engine
        .dispatch(Command::set_content(sheet1(), at("A1"), "=B1"))
        .unwrap();
    engine
        .dispatch(Command::set_content(sheet1(), at("B1"), "=A1+1"))
        .unwrap();
    let json = engine.to_json().unwrap();

    let loaded = SpreadsheetEngine::from_json(ClientId::from("bob"), EngineConfig::default(), &json).unwrap();
    for a1 in ["A1", "B1"] {
        assert_eq!(
            loaded.get_cell_value(&sheet1(), at(a1)),
            CellValue::Error(CellError::CyclicReference)
        );
    }
}

#[test]
fn test_bad_json_is_an_error() {
    let mut engine = populated();
    let before = engine.to_snapshot();
    assert!(engine.load_json("{not json").is_err());
    assert_eq!(engine.to_snapshot(), before);
    assert!(SpreadsheetEngine::from_json(ClientId::from("x"), EngineConfig::default(), "[]").is_err());
}
