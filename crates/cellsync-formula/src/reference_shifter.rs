use cellsync_core::{shift_index, shift_span, Axis, CellError, SheetId};
use serde::{Deserialize, Serialize};

use crate::ast::{Expr, RefExpr};
use crate::compiler::SheetResolver;
use crate::parser::parse_formula;

/// Rows or columns inserted (`delta > 0`) or deleted (`delta < 0`) at
/// index `at` of one sheet
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StructuralEdit {
    pub sheet: SheetId,
    pub axis: Axis,
    pub at: u32,
    pub delta: i64,
}

impl StructuralEdit {
    pub fn insert(sheet: SheetId, axis: Axis, at: u32, count: u32) -> Self {
        StructuralEdit {
            sheet,
            axis,
            at,
            delta: count as i64,
        }
    }

    pub fn delete(sheet: SheetId, axis: Axis, at: u32, count: u32) -> Self {
        StructuralEdit {
            sheet,
            axis,
            at,
            delta: -(count as i64),
        }
    }

    pub fn is_insert(&self) -> bool {
        self.delta > 0
    }

    /// Lines this edit inserts or deletes
    pub fn count(&self) -> u32 {
        u32::try_from(self.delta.unsigned_abs()).unwrap_or(u32::MAX)
    }

    fn same_lines(&self, other: &StructuralEdit) -> bool {
        self.sheet == other.sheet && self.axis == other.axis
    }

    /// This edit, made concurrently with `by`, restated for after `by`.
    /// Inserts at the same index land after `by`'s lines; an insert inside
    /// a band `by` deleted lands at the band start. A delete narrows to the
    /// lines `by` left and is `None` when none are left.
    pub fn rebase(&self, by: &StructuralEdit) -> Option<StructuralEdit> {
        if !self.same_lines(by) {
            return Some(self.clone());
        }
        if self.is_insert() {
            let at = shift_index(self.at, by.at, by.delta).unwrap_or(by.at);
            return Some(StructuralEdit { at, ..self.clone() });
        }
        let last = self.at.checked_add(self.count().checked_sub(1)?)?;
        let (lo, hi) = shift_span(self.at, last, by.at, by.delta)?;
        Some(StructuralEdit::delete(self.sheet.clone(), self.axis, lo, hi - lo + 1))
    }

    /// Like [`StructuralEdit::rebase`], except that this edit keeps its
    /// place when both insert at the same index: its lines stay in front.
    pub fn rebase_ahead(&self, by: &StructuralEdit) -> Option<StructuralEdit> {
        if self.same_lines(by) && self.is_insert() && by.is_insert() && self.at == by.at {
            return Some(self.clone());
        }
        self.rebase(by)
    }

    /// Whether `other` exactly undoes this edit
    pub fn is_inverse_of(&self, other: &StructuralEdit) -> bool {
        self.same_lines(other) && self.at == other.at && self.delta == -other.delta
    }
}

/// Rebuild `expr` with every reference replaced by `map(reference)`
pub fn map_references(expr: &Expr, map: &mut impl FnMut(&RefExpr) -> Expr) -> Expr {
    match expr {
        Expr::Reference(r) => map(r),
        Expr::Binary { left, op, right } => {
            Expr::binary(map_references(left, map), *op, map_references(right, map))
        }
        Expr::Unary { op, operand } => Expr::unary(*op, map_references(operand, map)),
        Expr::FunctionCall { name, args } => Expr::FunctionCall {
            name: name.clone(),
            args: args.iter().map(|arg| map_references(arg, map)).collect(),
        },
        Expr::Grouped(inner) => Expr::Grouped(Box::new(map_references(inner, map))),
        other => other.clone(),
    }
}

/// Move one reference through a structural edit. References into deleted
/// lines become `#REF!`; ranges narrow and only break when every line
/// they cover is gone. `$` markers do not pin a reference.
pub fn shift_reference(r: &RefExpr, edit: &StructuralEdit) -> Expr {
    match r.end {
        None => match r.start.coord().shifted(edit.axis, edit.at, edit.delta) {
            Some(coord) => Expr::Reference(RefExpr {
                sheet: r.sheet.clone(),
                start: r.start.moved_to(coord),
                end: None,
            }),
            None => Expr::Error(CellError::InvalidReference),
        },
        Some(end) => match r.range().shifted(edit.axis, edit.at, edit.delta) {
            Some(range) => Expr::Reference(RefExpr {
                sheet: r.sheet.clone(),
                start: r.start.moved_to(range.start),
                end: Some(end.moved_to(range.end)),
            }),
            None => Expr::Error(CellError::InvalidReference),
        },
    }
}

/// Rewrite formula text living on `host` for a structural edit.
///
/// Returns `None` when nothing changes or the text does not parse.
///
/// Insert rows:
/// ```
/// use cellsync_core::{Axis, SheetId};
/// use cellsync_formula::{shift_formula, SheetResolver, StructuralEdit};
///
/// struct NoSheets;
/// impl SheetResolver for NoSheets {
///     fn resolve_sheet(&self, _: &str) -> Option<SheetId> { None }
/// }
///
/// let host = SheetId::from("s1");
/// let edit = StructuralEdit::insert(host.clone(), Axis::Row, 2, 2);
/// assert_eq!(shift_formula("A1+B3", &host, &edit, &NoSheets), Some("A1+B5".to_string()));
/// ```
///
/// Deleting a referenced row:
/// ```
/// # use cellsync_core::{Axis, SheetId};
/// # use cellsync_formula::{shift_formula, SheetResolver, StructuralEdit};
/// # struct NoSheets;
/// # impl SheetResolver for NoSheets {
/// #     fn resolve_sheet(&self, _: &str) -> Option<SheetId> { None }
/// # }
/// let host = SheetId::from("s1");
/// let edit = StructuralEdit::delete(host.clone(), Axis::Row, 2, 1);
/// assert_eq!(shift_formula("A1+B3", &host, &edit, &NoSheets), Some("A1+#REF!".to_string()));
/// assert_eq!(shift_formula("SUM(A1:A3)", &host, &edit, &NoSheets), Some("SUM(A1:A2)".to_string()));
/// ```
pub fn shift_formula(
    text: &str,
    host: &SheetId,
    edit: &StructuralEdit,
    resolver: &dyn SheetResolver,
) -> Option<String> {
    let expr = parse_formula(text).ok()?;

    let mut changed = false;
    let shifted = map_references(&expr, &mut |r| {
        let target = match &r.sheet {
            None => Some(host.clone()),
            Some(name) => resolver.resolve_sheet(name),
        };
        if target.as_ref() != Some(&edit.sheet) {
            return Expr::Reference(r.clone());
        }
        let moved = shift_reference(r, edit);
        if moved != Expr::Reference(r.clone()) {
            changed = true;
        }
        moved
    });

    changed.then(|| shifted.to_string())
}
