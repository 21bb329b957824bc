//! Image operators of the compositing graph

use rayon::prelude::*;

use crate::error::ExecutionError;
use crate::nodes::execution_engine::ExecutionContext;
use crate::nodes::factory::{NodeCategory, NodeFactory, NodeMetadata, PortDefinition};
use crate::nodes::interface::{ImageBuffer, NodeData, ParamValue, Parameters};
use crate::nodes::operator::{Operator, OperatorKind};
use crate::nodes::SocketKind;

/// Fills the output region with one color
#[derive(Debug, Default)]
pub struct SolidColorOperator;

impl NodeFactory for SolidColorOperator {
    fn metadata() -> NodeMetadata {
        NodeMetadata::new(
            "compositing.solid_color",
            "Solid Color",
            NodeCategory::compositing(),
            "Image of a single color covering the output region",
        )
        .with_tags(vec!["image", "source"])
    }

    fn create() -> Box<dyn Operator> {
        Box::new(Self)
    }
}

impl Operator for SolidColorOperator {
    fn type_name(&self) -> &'static str {
        "compositing.solid_color"
    }

    fn inputs(&self) -> Vec<PortDefinition> {
        vec![]
    }

    fn outputs(&self) -> Vec<PortDefinition> {
        vec![PortDefinition::required("image", SocketKind::Image)]
    }

    fn default_parameters(&self) -> Parameters {
        Parameters::new().with("color", ParamValue::Color([0.5, 0.5, 0.5, 1.0]))
    }

    fn execute(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<(), ExecutionError> {
        let color = ctx.parameters().color_or("color", [0.5, 0.5, 0.5, 1.0]);
        let region = ctx.evaluation().region;
        let image = ImageBuffer::filled(region.width as usize, region.height as usize, color);
        ctx.set_output(0, NodeData::Image(image));
        Ok(())
    }
}

/// Multiplies the color channels, leaving alpha alone
#[derive(Debug, Default)]
pub struct GainOperator;

impl NodeFactory for GainOperator {
    fn metadata() -> NodeMetadata {
        NodeMetadata::new("compositing.gain", "Gain", NodeCategory::compositing(), "Scale image brightness")
    }

    fn create() -> Box<dyn Operator> {
        Box::new(Self)
    }
}

impl Operator for GainOperator {
    fn type_name(&self) -> &'static str {
        "compositing.gain"
    }

    fn inputs(&self) -> Vec<PortDefinition> {
        vec![PortDefinition::required("image", SocketKind::Image)]
    }

    fn outputs(&self) -> Vec<PortDefinition> {
        vec![PortDefinition::required("image", SocketKind::Image)]
    }

    fn default_parameters(&self) -> Parameters {
        Parameters::new().with("gain", ParamValue::Float(1.0))
    }

    fn execute(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<(), ExecutionError> {
        let gain = ctx.parameters().float_or("gain", 1.0);
        let mut image = ctx.input_image(0)?;
        let progress = ctx.progress().clone();
        let rows = image.height.max(1) as f32;
        let width = image.width.max(1);

        image
            .pixels
            .par_chunks_mut(width)
            .try_for_each(|row| {
                if progress.is_interrupted() {
                    return Err(ExecutionError::Interrupted);
                }
                for pixel in row.iter_mut() {
                    for channel in &mut pixel[..3] {
                        *channel *= gain;
                    }
                }
                progress.advance(1.0 / rows);
                Ok(())
            })?;

        ctx.set_output(0, NodeData::Image(image));
        Ok(())
    }
}

/// Compositing sink keeping the last image it received
#[derive(Debug, Default)]
pub struct ViewerOperator {
    image: Option<NodeData>,
}

impl ViewerOperator {
    pub fn image(&self) -> Option<&ImageBuffer> {
        match &self.image {
            Some(NodeData::Image(image)) => Some(image),
            _ => None,
        }
    }
}

impl NodeFactory for ViewerOperator {
    fn metadata() -> NodeMetadata {
        NodeMetadata::new("compositing.viewer", "Viewer", NodeCategory::output(), "Displays an image")
            .with_tags(vec!["output", "sink"])
    }

    fn create() -> Box<dyn Operator> {
        Box::new(Self::default())
    }
}

impl Operator for ViewerOperator {
    fn type_name(&self) -> &'static str {
        "compositing.viewer"
    }

    fn kind(&self) -> OperatorKind {
        OperatorKind::Viewer
    }

    fn inputs(&self) -> Vec<PortDefinition> {
        vec![PortDefinition::required("image", SocketKind::Image)]
    }

    fn outputs(&self) -> Vec<PortDefinition> {
        vec![]
    }

    fn execute(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<(), ExecutionError> {
        self.image = None;
        let image = ctx.input_image(0)?;
        self.image = Some(NodeData::Image(image));
        Ok(())
    }

    fn result(&self) -> Option<&NodeData> {
        self.image.as_ref()
    }
}
