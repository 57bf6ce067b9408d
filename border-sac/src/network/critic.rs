//! State-value critic.
use super::{NetworkBody, NetworkSettings, ObservationSpec, StreamValues, ValueHeads};
use anyhow::Result;
use candle_core::{DType, Device, Tensor, Var};
use candle_nn::{VarBuilder, VarMap};

/// State-value network with one output per reward stream.
///
/// The critic owns its [`VarMap`]. Variables are named under the `critic`
/// prefix, so two critics built with the same settings have matching names,
/// which is what [`track`](crate::util::track) relies on. This is how the
/// target network of the SAC optimizer follows the critic of the policy.
pub struct Critic {
    varmap: VarMap,
    body: NetworkBody,
    heads: ValueHeads,
}

impl Critic {
    /// Constructs [`Critic`].
    pub fn build(
        stream_names: &[String],
        obs_spec: &ObservationSpec,
        settings: &NetworkSettings,
        device: &Device,
    ) -> Result<Self> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, device).pp("critic");
        let body = NetworkBody::build(vb.pp("body"), obs_spec, settings, 0)?;
        let heads = ValueHeads::build(
            vb.pp("value_heads"),
            stream_names,
            body.out_dim(),
            1,
        )?;

        Ok(Self {
            varmap,
            body,
            heads,
        })
    }

    /// Returns state values of shape `[batch_size]` for each stream.
    pub fn forward(&self, vec_inputs: &[Tensor], vis_inputs: &[Tensor]) -> Result<StreamValues> {
        let hidden = self.body.forward(vec_inputs, vis_inputs, None)?;
        self.heads.forward(&hidden)
    }

    /// Network body.
    pub fn network_body(&self) -> &NetworkBody {
        &self.body
    }

    /// Mutable network body, used to update normalization statistics.
    pub fn network_body_mut(&mut self) -> &mut NetworkBody {
        &mut self.body
    }

    /// Variables of the critic.
    pub fn varmap(&self) -> &VarMap {
        &self.varmap
    }

    /// All trainable variables.
    pub fn vars(&self) -> Vec<Var> {
        self.varmap.all_vars()
    }

    /// Names of the reward streams.
    pub fn stream_names(&self) -> Vec<String> {
        self.heads.stream_names()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::util::{snapshot, track};

    fn streams() -> Vec<String> {
        vec!["extrinsic".to_string(), "curiosity".to_string()]
    }

    #[test]
    fn test_forward_shapes() -> Result<()> {
        let device = Device::Cpu;
        let settings = NetworkSettings::default().hidden_units(16).num_layers(2);
        let critic = Critic::build(&streams(), &ObservationSpec::vector(3), &settings, &device)?;
        let obs = Tensor::ones((4, 3), DType::F32, &device)?;
        let values = critic.forward(&[obs], &[])?;

        assert_eq!(values.len(), 2);
        for v in values.values() {
            assert_eq!(v.dims(), &[4]);
        }
        assert_eq!(critic.stream_names(), vec!["curiosity", "extrinsic"]);
        Ok(())
    }

    #[test]
    fn test_hard_copy_gives_same_outputs() -> Result<()> {
        let device = Device::Cpu;
        let settings = NetworkSettings::default().hidden_units(8);
        let spec = ObservationSpec::vector(2);
        let src = Critic::build(&streams(), &spec, &settings, &device)?;
        let dest = Critic::build(&streams(), &spec, &settings, &device)?;
        track(dest.varmap(), src.varmap(), 1.0)?;

        for ((k1, t1), (k2, t2)) in snapshot(src.varmap())?.iter().zip(snapshot(dest.varmap())?.iter()) {
            assert_eq!(k1, k2);
            assert_eq!(
                t1.flatten_all()?.to_vec1::<f32>()?,
                t2.flatten_all()?.to_vec1::<f32>()?
            );
        }

        let obs = Tensor::from_slice(&[0.3f32, -1.2], (1, 2), &device)?;
        let v1 = src.forward(&[obs.clone()], &[])?;
        let v2 = dest.forward(&[obs], &[])?;
        assert_eq!(
            v1["extrinsic"].to_vec1::<f32>()?,
            v2["extrinsic"].to_vec1::<f32>()?
        );
        Ok(())
    }
}
