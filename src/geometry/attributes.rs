//! Typed, growable columnar attribute buffers attached to geometry

use glam::Vec3;

/// Element type of an attribute column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeKind {
    Scalar,
    Integer,
    Vector,
    Color,
}

impl AttributeKind {
    /// Floats stored per element
    pub fn components(self) -> usize {
        match self {
            AttributeKind::Scalar | AttributeKind::Integer => 1,
            AttributeKind::Vector => 3,
            AttributeKind::Color => 4,
        }
    }
}

/// One named column. Values are stored flat, `components()` floats per element.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    name: String,
    kind: AttributeKind,
    data: Vec<f32>,
}

impl Attribute {
    pub fn new(name: impl Into<String>, kind: AttributeKind, len: usize) -> Self {
        Self {
            name: name.into(),
            kind,
            data: vec![0.0; len * kind.components()],
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> AttributeKind {
        self.kind
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        self.data.len() / self.kind.components()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Grow or shrink to `len` elements; new elements are zeroed
    pub fn resize(&mut self, len: usize) {
        self.data.resize(len * self.kind.components(), 0.0);
    }

    pub fn get(&self, index: usize) -> Option<&[f32]> {
        let n = self.kind.components();
        self.data.get(index * n..(index + 1) * n)
    }

    pub fn set(&mut self, index: usize, values: &[f32]) -> bool {
        let n = self.kind.components();
        match self.data.get_mut(index * n..(index + 1) * n) {
            Some(slot) => {
                let count = values.len().min(n);
                slot[..count].copy_from_slice(&values[..count]);
                true
            }
            None => false,
        }
    }

    pub fn vec3(&self, index: usize) -> Option<Vec3> {
        match self.kind {
            AttributeKind::Vector | AttributeKind::Color => {
                self.get(index).map(|v| Vec3::new(v[0], v[1], v[2]))
            }
            AttributeKind::Scalar | AttributeKind::Integer => self.get(index).map(|v| Vec3::splat(v[0])),
        }
    }

    pub fn set_vec3(&mut self, index: usize, value: Vec3) -> bool {
        self.set(index, &value.to_array())
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }
}

/// Collection of attribute columns sharing one element count
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AttributeStore {
    len: usize,
    attributes: Vec<Attribute>,
}

impl AttributeStore {
    pub fn new(len: usize) -> Self {
        Self {
            len,
            attributes: Vec::new(),
        }
    }

    /// Element count shared by every column
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Return the column `name`, creating it (or replacing one of another kind)
    pub fn add(&mut self, name: &str, kind: AttributeKind) -> &mut Attribute {
        let index = match self.attributes.iter().position(|a| a.name == name) {
            Some(index) if self.attributes[index].kind == kind => index,
            Some(index) => {
                self.attributes[index] = Attribute::new(name, kind, self.len);
                index
            }
            None => {
                self.attributes.push(Attribute::new(name, kind, self.len));
                self.attributes.len() - 1
            }
        };
        &mut self.attributes[index]
    }

    pub fn get(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Attribute> {
        self.attributes.iter_mut().find(|a| a.name == name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Attribute> {
        let index = self.attributes.iter().position(|a| a.name == name)?;
        Some(self.attributes.remove(index))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.attributes.iter().map(|a| a.name())
    }

    /// Resize every column to `len` elements
    pub fn resize(&mut self, len: usize) {
        self.len = len;
        for attribute in &mut self.attributes {
            attribute.resize(len);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_reuses_matching_column() {
        let mut store = AttributeStore::new(4);
        store.add("N", AttributeKind::Vector).set_vec3(1, Vec3::Y);
        let column = store.add("N", AttributeKind::Vector);
        assert_eq!(column.vec3(1), Some(Vec3::Y));
        assert_eq!(column.len(), 4);
    }

    #[test]
    fn test_add_replaces_column_of_other_kind() {
        let mut store = AttributeStore::new(2);
        store.add("weight", AttributeKind::Scalar).set(0, &[0.5]);
        let column = store.add("weight", AttributeKind::Color);
        assert_eq!(column.kind(), AttributeKind::Color);
        assert_eq!(column.get(0), Some(&[0.0, 0.0, 0.0, 0.0][..]));
    }

    #[test]
    fn test_resize_grows_all_columns() {
        let mut store = AttributeStore::new(1);
        store.add("a", AttributeKind::Scalar);
        store.add("C", AttributeKind::Color);
        store.resize(10);
        assert_eq!(store.len(), 10);
        assert_eq!(store.get("a").unwrap().len(), 10);
        assert_eq!(store.get("C").unwrap().as_slice().len(), 40);
    }

    #[test]
    fn test_out_of_range_access() {
        let mut attribute = Attribute::new("P", AttributeKind::Vector, 2);
        assert!(!attribute.set_vec3(2, Vec3::ONE));
        assert_eq!(attribute.vec3(5), None);
        assert!(attribute.set(1, &[1.0, 2.0, 3.0]));
        assert_eq!(attribute.vec3(1), Some(Vec3::new(1.0, 2.0, 3.0)));
    }

    #[test]
    fn test_remove_and_names() {
        let mut store = AttributeStore::new(3);
        store.add("a", AttributeKind::Scalar);
        store.add("b", AttributeKind::Integer);
        assert!(store.remove("a").is_some());
        assert!(store.remove("a").is_none());
        assert_eq!(store.names().collect::<Vec<_>>(), vec!["b"]);
    }
}
