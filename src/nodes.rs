// Copyright 2025 Cornell University
// released under MIT License

//! Reference nodes for the image pipeline protocols

use clap::ValueEnum;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::errors::{ProtocolError, ProtocolResult};
use crate::node::{Context, Node};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum NodeKind {
    /// echoes every image it receives (`image_filter`)
    ImageFilter,
    /// produces synthetic episodes of images (`image_source`)
    ImageSource,
    /// answers camera images with random motor commands (`agent_jpg_pwm`)
    RandomAgent,
}

impl NodeKind {
    pub fn build(self) -> Box<dyn Node> {
        match self {
            NodeKind::ImageFilter => Box::new(DummyImageFilter),
            NodeKind::ImageSource => Box::new(DummyImageSource::default()),
            NodeKind::RandomAgent => Box::new(RandomAgent::from_entropy()),
        }
    }

    /// Name of the built-in protocol the node implements
    pub fn protocol_name(self) -> &'static str {
        match self {
            NodeKind::ImageFilter => "image_filter",
            NodeKind::ImageSource => "image_source",
            NodeKind::RandomAgent => "agent_jpg_pwm",
        }
    }
}

/// Sets one field of a serde-serializable configuration by name.
fn update_config<T: Serialize + DeserializeOwned>(
    config: &mut T,
    key: &str,
    value: Value,
) -> ProtocolResult<()> {
    let err = |reason: String| ProtocolError::Config {
        key: key.to_string(),
        reason,
    };
    let mut fields = serde_json::to_value(&*config).map_err(|e| err(e.to_string()))?;
    match fields.get_mut(key) {
        Some(field) => *field = value,
        None => return Err(err("no such configuration key".to_string())),
    }
    *config = serde_json::from_value(fields).map_err(|e| err(e.to_string()))?;
    Ok(())
}

pub struct DummyImageFilter;

impl Node for DummyImageFilter {
    fn name(&self) -> &str {
        "dummy_image_filter"
    }

    fn handlers(&self) -> &[&str] {
        &["episode_start", "image"]
    }

    fn init(&mut self, ctx: &mut Context<'_>) -> anyhow::Result<()> {
        ctx.log("init()");
        Ok(())
    }

    fn on_received(&mut self, channel: &str, data: Value, ctx: &mut Context<'_>) -> anyhow::Result<()> {
        ctx.write(channel, data)?;
        Ok(())
    }

    fn finish(&mut self, ctx: &mut Context<'_>) -> anyhow::Result<()> {
        ctx.log("finish()");
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DummyImageSourceConfig {
    /// height and width of the images
    pub shape: (u32, u32),
    pub images_per_episode: u32,
    pub num_episodes: u32,
}

impl Default for DummyImageSourceConfig {
    fn default() -> Self {
        Self {
            shape: (480, 640),
            images_per_episode: 120,
            num_episodes: 10,
        }
    }
}

#[derive(Debug, Default)]
pub struct DummyImageSource {
    pub config: DummyImageSourceConfig,
    /// index of the current episode
    episode: Option<u32>,
    nimages: u32,
}

impl DummyImageSource {
    pub fn new(config: DummyImageSourceConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    fn start_episode(&mut self, ctx: &mut Context<'_>) -> ProtocolResult<()> {
        let next = self.episode.map_or(0, |e| e + 1);
        if next >= self.config.num_episodes {
            return ctx.write("no_more_episodes", Value::Null);
        }
        self.episode = Some(next);
        self.nimages = 0;
        ctx.write("episode_start", json!({ "episode_name": format!("episode{}", next) }))
    }

    fn next_image(&mut self, ctx: &mut Context<'_>) -> ProtocolResult<()> {
        if self.nimages >= self.config.images_per_episode {
            return ctx.write("no_more_images", Value::Null);
        }
        self.nimages += 1;
        let (height, width) = self.config.shape;
        let image = json!({
            "shape": [height, width],
            "episode": self.episode,
            "frame": self.nimages,
        });
        ctx.write("image", image)
    }
}

impl Node for DummyImageSource {
    fn name(&self) -> &str {
        "dummy_image_source"
    }

    fn handlers(&self) -> &[&str] {
        &["next_episode", "next_image"]
    }

    fn init(&mut self, _ctx: &mut Context<'_>) -> anyhow::Result<()> {
        self.episode = None;
        self.nimages = 0;
        Ok(())
    }

    fn on_received(&mut self, channel: &str, _data: Value, ctx: &mut Context<'_>) -> anyhow::Result<()> {
        match channel {
            "next_episode" => self.start_episode(ctx)?,
            "next_image" => self.next_image(ctx)?,
            other => anyhow::bail!("{} cannot handle `{}`", self.name(), other),
        }
        Ok(())
    }

    fn config(&self) -> Option<Value> {
        serde_json::to_value(&self.config).ok()
    }

    fn set_config(&mut self, key: &str, value: Value) -> ProtocolResult<()> {
        update_config(&mut self.config, key, value)
    }

    fn on_updated_config(&mut self, key: &str, value: &Value, ctx: &mut Context<'_>) -> anyhow::Result<()> {
        ctx.log(format!("Config was updated: {} = {}", key, value));
        Ok(())
    }
}

pub struct RandomAgent {
    rng: StdRng,
}

impl RandomAgent {
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Node for RandomAgent {
    fn name(&self) -> &str {
        "random_agent"
    }

    fn handlers(&self) -> &[&str] {
        &["camera_image", "episode_start"]
    }

    fn init(&mut self, ctx: &mut Context<'_>) -> anyhow::Result<()> {
        ctx.log("init()");
        Ok(())
    }

    fn on_received(&mut self, channel: &str, data: Value, ctx: &mut Context<'_>) -> anyhow::Result<()> {
        match channel {
            "episode_start" => ctx.log(format!("episode start: {}", data)),
            "camera_image" => {
                let commands = json!({
                    "motor_left": self.rng.gen_range(0.0..1.0),
                    "motor_right": self.rng.gen_range(0.0..1.0),
                });
                ctx.write("pwm_commands", commands)?;
            }
            other => anyhow::bail!("{} cannot handle `{}`", self.name(), other),
        }
        Ok(())
    }

    fn finish(&mut self, ctx: &mut Context<'_>) -> anyhow::Result<()> {
        ctx.log("finish()");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{check_implementation, describe_node};
    use crate::registry::Registry;

    #[test]
    fn reference_nodes_implement_their_protocols() {
        let registry = Registry::builtin();
        for kind in NodeKind::value_variants() {
            let protocol = registry.get(kind.protocol_name()).unwrap();
            let node = kind.build();
            check_implementation(node.as_ref(), &protocol).unwrap();
        }
    }

    #[test]
    fn image_source_config() {
        let mut source = DummyImageSource::default();
        assert_eq!(
            describe_node(&source),
            json!({
                "name": "dummy_image_source",
                "config": {"shape": [480, 640], "images_per_episode": 120, "num_episodes": 10}
            })
        );

        source.set_config("num_episodes", json!(2)).unwrap();
        assert_eq!(source.config.num_episodes, 2);
        source.set_config("shape", json!([2, 3])).unwrap();
        assert_eq!(source.config.shape, (2, 3));

        let err = source.set_config("num_episode", json!(2)).unwrap_err();
        assert!(matches!(err, ProtocolError::Config { ref key, .. } if key == "num_episode"));
        let err = source.set_config("num_episodes", json!("many")).unwrap_err();
        assert!(matches!(err, ProtocolError::Config { .. }));
        assert_eq!(source.config.num_episodes, 2);
    }
}
