//! Type descriptors: the per-type field-kind table.
//!
//! A descriptor says, for one allocatable type, which words of the payload
//! hold traced references and which are opaque scalars. Types that carry a
//! runtime-sized tail (strings, slabs) describe it with a
//! [`VariableRegion`].
//!
//! ```text
//! payload:  ┌──────── fixed_size ────────┬──── count × element_size ────┐
//!           │ field @0 │ field @8 │ ...  │ e0 │ e1 │ ...                 │
//!           └────────────────────────────┴──────────────────────────────┘
//!                 ▲ count word lives in the fixed part
//! ```

use smallvec::SmallVec;

/// Size of a reference (and of every described field).
pub const WORD_SIZE: usize = std::mem::size_of::<usize>();

/// Identifier issued by the descriptor table.
///
/// Zero is never issued, so a zeroed header cannot name a real type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(u32);

impl TypeId {
    /// Wrap a raw id.
    #[inline]
    pub const fn from_u32(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw id as stored in headers.
    #[inline]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for TypeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a described word holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// A heap reference (or zero) the collectors must follow.
    TracedReference,
    /// Opaque data.
    Scalar,
}

/// One fixed field of a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// Byte offset from the start of the payload.
    pub offset: usize,
    /// Kind of the word at `offset`.
    pub kind: FieldKind,
}

/// Runtime-sized tail of a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VariableRegion {
    /// Offset of the word holding the element count.
    pub count_offset: usize,
    /// Kind of every element.
    pub element_kind: FieldKind,
    /// Bytes per element; one word for traced elements.
    pub element_size: usize,
}

impl VariableRegion {
    /// Tail of `count` traced references.
    pub const fn traced(count_offset: usize) -> Self {
        Self {
            count_offset,
            element_kind: FieldKind::TracedReference,
            element_size: WORD_SIZE,
        }
    }

    /// Tail of `count` opaque elements of `element_size` bytes each.
    pub const fn scalar(count_offset: usize, element_size: usize) -> Self {
        Self {
            count_offset,
            element_kind: FieldKind::Scalar,
            element_size,
        }
    }
}

/// Immutable layout description of one allocatable type.
///
/// # Example
///
/// ```ignore
/// // struct Pair { left: Ref, right: Ref, hash: u64 }
/// let pair = TypeDescriptor::new("Pair", 24)
///     .traced(0)
///     .traced(8)
///     .scalar(16);
/// let id = heap.register_type(pair)?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDescriptor {
    name: String,
    fixed_size: usize,
    fields: SmallVec<[FieldDescriptor; 4]>,
    variable: Option<VariableRegion>,
}

impl TypeDescriptor {
    /// Start describing a type whose fixed part is `fixed_size` bytes.
    pub fn new(name: impl Into<String>, fixed_size: usize) -> Self {
        Self {
            name: name.into(),
            fixed_size,
            fields: SmallVec::new(),
            variable: None,
        }
    }

    /// Declare a traced reference at `offset`.
    pub fn traced(mut self, offset: usize) -> Self {
        self.fields.push(FieldDescriptor {
            offset,
            kind: FieldKind::TracedReference,
        });
        self
    }

    /// Declare an opaque word at `offset`.
    pub fn scalar(mut self, offset: usize) -> Self {
        self.fields.push(FieldDescriptor {
            offset,
            kind: FieldKind::Scalar,
        });
        self
    }

    /// Attach a runtime-sized tail.
    pub fn with_variable_region(mut self, region: VariableRegion) -> Self {
        self.variable = Some(region);
        self
    }

    /// Name used in diagnostics.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Size of the fixed part; the variable region starts here.
    pub fn fixed_size(&self) -> usize {
        self.fixed_size
    }

    /// Declared fixed fields, in declaration order.
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// The variable-length tail, if any.
    pub fn variable_region(&self) -> Option<&VariableRegion> {
        self.variable.as_ref()
    }

    /// Offsets of traced fixed fields, in declaration order.
    pub fn traced_offsets(&self) -> impl Iterator<Item = usize> + '_ {
        self.fields
            .iter()
            .filter(|f| f.kind == FieldKind::TracedReference)
            .map(|f| f.offset)
    }

    /// Extra payload bytes needed for `count` tail elements.
    pub fn extra_bytes_for(&self, count: usize) -> usize {
        self.variable
            .map(|region| count * region.element_size)
            .unwrap_or(0)
    }

    /// Check the layout is self-consistent.
    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.fixed_size % WORD_SIZE != 0 {
            return Err(format!(
                "fixed size {} is not a multiple of {WORD_SIZE}",
                self.fixed_size
            ));
        }

        let mut seen: SmallVec<[usize; 8]> = SmallVec::new();
        for field in &self.fields {
            check_word(field.offset, self.fixed_size, "field")?;
            if seen.contains(&field.offset) {
                return Err(format!("field at offset {} declared twice", field.offset));
            }
            seen.push(field.offset);
        }

        if let Some(region) = &self.variable {
            check_word(region.count_offset, self.fixed_size, "count word")?;
            let overlaps_reference = self.fields.iter().any(|f| {
                f.offset == region.count_offset && f.kind == FieldKind::TracedReference
            });
            if overlaps_reference {
                return Err(format!(
                    "count word at offset {} overlaps a traced field",
                    region.count_offset
                ));
            }
            if region.element_size == 0 {
                return Err("variable region element size is zero".to_string());
            }
            if region.element_kind == FieldKind::TracedReference
                && region.element_size != WORD_SIZE
            {
                return Err(format!(
                    "traced elements must be {WORD_SIZE} bytes, not {}",
                    region.element_size
                ));
            }
        }

        Ok(())
    }
}

fn check_word(offset: usize, fixed_size: usize, what: &str) -> Result<(), String> {
    if offset % WORD_SIZE != 0 {
        return Err(format!("{what} at offset {offset} is misaligned"));
    }
    if offset + WORD_SIZE > fixed_size {
        return Err(format!(
            "{what} at offset {offset} lies outside the fixed size {fixed_size}"
        ));
    }
    Ok(())
}
