//! Point sources and the sink of an object's geometry graph

use crate::error::ExecutionError;
use crate::geometry::PointCloud;
use crate::nodes::execution_engine::ExecutionContext;
use crate::nodes::factory::{NodeCategory, NodeFactory, NodeMetadata, PortDefinition};
use crate::nodes::interface::{NodeData, ParamValue, Parameters};
use crate::nodes::operator::{Operator, OperatorKind};
use crate::nodes::SocketKind;

/// Regular grid of points in the XZ plane
#[derive(Debug, Default)]
pub struct PointGridOperator;

impl NodeFactory for PointGridOperator {
    fn metadata() -> NodeMetadata {
        NodeMetadata::new("geometry.point_grid", "Point Grid", NodeCategory::geometry(), "Grid of points")
            .with_tags(vec!["source", "grid"])
    }

    fn create() -> Box<dyn Operator> {
        Box::new(Self)
    }
}

impl Operator for PointGridOperator {
    fn type_name(&self) -> &'static str {
        "geometry.point_grid"
    }

    fn inputs(&self) -> Vec<PortDefinition> {
        vec![]
    }

    fn outputs(&self) -> Vec<PortDefinition> {
        vec![PortDefinition::required("points", SocketKind::Points)]
    }

    fn default_parameters(&self) -> Parameters {
        Parameters::new()
            .with("columns", ParamValue::Int(10))
            .with("rows", ParamValue::Int(10))
            .with("size", ParamValue::Float(1.0))
    }

    fn execute(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<(), ExecutionError> {
        let params = ctx.parameters();
        let columns = params.int_or("columns", 10).max(0) as usize;
        let rows = params.int_or("rows", 10).max(0) as usize;
        let size = params.float_or("size", 1.0);
        if columns == 0 || rows == 0 {
            ctx.add_warning("grid is empty");
        }
        ctx.set_output(0, NodeData::Points(PointCloud::grid(columns, rows, size)));
        Ok(())
    }
}

/// Sink collecting the points an object is made of
#[derive(Debug, Default)]
pub struct ObjectOutputOperator {
    points: Option<NodeData>,
}

impl ObjectOutputOperator {
    pub fn points(&self) -> Option<&PointCloud> {
        match &self.points {
            Some(NodeData::Points(points)) => Some(points),
            _ => None,
        }
    }
}

impl NodeFactory for ObjectOutputOperator {
    fn metadata() -> NodeMetadata {
        NodeMetadata::new(
            "geometry.object_output",
            "Object Output",
            NodeCategory::output(),
            "Geometry of the enclosing object",
        )
        .with_tags(vec!["output", "sink"])
    }

    fn create() -> Box<dyn Operator> {
        Box::new(Self::default())
    }
}

impl Operator for ObjectOutputOperator {
    fn type_name(&self) -> &'static str {
        "geometry.object_output"
    }

    fn kind(&self) -> OperatorKind {
        OperatorKind::ObjectOutput
    }

    fn inputs(&self) -> Vec<PortDefinition> {
        vec![PortDefinition::required("points", SocketKind::Points)]
    }

    fn outputs(&self) -> Vec<PortDefinition> {
        vec![]
    }

    fn execute(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<(), ExecutionError> {
        self.points = None;
        let points = ctx.input_points(0)?;
        self.points = Some(NodeData::Points(points));
        Ok(())
    }

    fn result(&self) -> Option<&NodeData> {
        self.points.as_ref()
    }
}
