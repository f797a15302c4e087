//! `TYPE ... END TYPE` record layout (spec.md §4.2.6).
//!
//! Field offsets use natural alignment per field size (1/2/4/8 bytes),
//! padded so each field starts on a multiple of its own alignment and the
//! whole record's size is a multiple of its largest field's alignment.
//! Layouts are computed once per named type and cached, since member
//! access chains (`a.b.c`) and array-of-UDT stride arithmetic both need
//! the same offsets repeatedly.

use crate::symbols::{SymbolTable, TypeSymbol};
use crate::types::TypeDescriptor;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct FieldLayout {
    pub name: String,
    pub offset: u32,
    pub field_type: TypeDescriptor,
}

#[derive(Debug, Clone)]
pub struct UdtLayout {
    pub size: u32,
    pub align: u32,
    pub fields: Vec<FieldLayout>,
}

impl UdtLayout {
    pub fn field(&self, name: &str) -> Option<&FieldLayout> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Computes and caches every named record's layout up front, so nested
/// records (a `UserDefined` field referencing another `TypeSymbol`) can be
/// sized before the records that contain them.
#[derive(Debug, Default)]
pub struct UdtLayouts {
    layouts: HashMap<String, UdtLayout>,
}

impl UdtLayouts {
    pub fn build(symbols: &SymbolTable) -> Self {
        let mut sizes: HashMap<String, u32> = HashMap::new();
        let mut order: Vec<&String> = symbols.types.keys().collect();
        order.sort();

        // Record layout can depend on other records; a couple of passes
        // over the (typically small, non-cyclic) type set lets later
        // passes pick up sizes established by earlier ones.
        for _ in 0..symbols.types.len().max(1) {
            for name in &order {
                let ty = &symbols.types[*name];
                sizes.insert((*name).clone(), layout_of(ty, &sizes).size);
            }
        }

        let mut layouts = HashMap::new();
        for name in &order {
            let ty = &symbols.types[*name];
            layouts.insert((*name).clone(), layout_of(ty, &sizes));
        }
        Self { layouts }
    }

    pub fn get(&self, type_name: &str) -> Option<&UdtLayout> {
        self.layouts.get(type_name)
    }
}

fn layout_of(ty: &TypeSymbol, sizes: &HashMap<String, u32>) -> UdtLayout {
    let mut offset = 0u32;
    let mut max_align = 1u32;
    let mut fields = Vec::with_capacity(ty.fields.len());

    for field in &ty.fields {
        let align = field.field_type.align_of(sizes);
        let size = field.field_type.size_of(sizes);
        max_align = max_align.max(align);
        offset = align_up(offset, align);
        fields.push(FieldLayout {
            name: field.name.clone(),
            offset,
            field_type: field.field_type.clone(),
        });
        offset += size;
    }

    let size = align_up(offset, max_align);
    UdtLayout {
        size,
        align: max_align,
        fields,
    }
}

fn align_up(offset: u32, align: u32) -> u32 {
    if align == 0 {
        return offset;
    }
    (offset + align - 1) / align * align
}

/// Generated code needed for a dotted access chain `record.a.b`: the QBE
/// instruction sequence that resolves to a pointer to the innermost field,
/// plus that field's descriptor for a following typed load/store.
pub fn member_offset_chain(
    layouts: &UdtLayouts,
    root_type: &str,
    path: &[String],
) -> Option<(u32, TypeDescriptor)> {
    let mut current_type = root_type.to_string();
    let mut total_offset = 0u32;
    let mut field_type = TypeDescriptor::Long;

    for part in path {
        let layout = layouts.get(&current_type)?;
        let field = layout.field(part)?;
        total_offset += field.offset;
        field_type = field.field_type.clone();
        if let TypeDescriptor::UserDefined(next) = &field.field_type {
            current_type = next.clone();
        }
    }
    Some((total_offset, field_type))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbols::TypeFieldSymbol;

    fn field(name: &str, t: TypeDescriptor) -> TypeFieldSymbol {
        TypeFieldSymbol {
            name: name.to_string(),
            field_type: t,
        }
    }

    #[test]
    fn byte_then_long_field_is_padded_to_8() {
        let ty = TypeSymbol {
            name: "Point3".to_string(),
            fields: vec![field("Flag", TypeDescriptor::Byte), field("Id", TypeDescriptor::Long)],
        };
        let layout = layout_of(&ty, &HashMap::new());
        assert_eq!(layout.field("Flag").unwrap().offset, 0);
        assert_eq!(layout.field("Id").unwrap().offset, 8);
        assert_eq!(layout.size, 16);
    }

    #[test]
    fn all_same_width_fields_pack_tightly() {
        let ty = TypeSymbol {
            name: "Vec2".to_string(),
            fields: vec![
                field("X", TypeDescriptor::Single),
                field("Y", TypeDescriptor::Single),
            ],
        };
        let layout = layout_of(&ty, &HashMap::new());
        assert_eq!(layout.field("X").unwrap().offset, 0);
        assert_eq!(layout.field("Y").unwrap().offset, 4);
        assert_eq!(layout.size, 8);
    }

    #[test]
    fn nested_record_chain_resolves_total_offset() {
        let mut symbols = SymbolTable::new();
        symbols.types.insert(
            "Inner".to_string(),
            TypeSymbol {
                name: "Inner".to_string(),
                fields: vec![field("V", TypeDescriptor::Long)],
            },
        );
        symbols.types.insert(
            "Outer".to_string(),
            TypeSymbol {
                name: "Outer".to_string(),
                fields: vec![
                    field("Tag", TypeDescriptor::Byte),
                    field("Child", TypeDescriptor::UserDefined("Inner".to_string())),
                ],
            },
        );
        let layouts = UdtLayouts::build(&symbols);
        let (offset, field_type) = member_offset_chain(
            &layouts,
            "Outer",
            &["Child".to_string(), "V".to_string()],
        )
        .unwrap();
        assert_eq!(offset, 8);
        assert_eq!(field_type, TypeDescriptor::Long);
    }
}
