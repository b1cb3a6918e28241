//! M2M100 Candle-based translator
//!
//! Native Rust implementation of `facebook/m2m100_418M`, a single
//! many-to-many model. The target language is selected by forcing its
//! language token as the first generated token.
//!
//! Model files come either from the Hugging Face hub or a local directory:
//! - config.json
//! - vocab.json
//! - sentencepiece.bpe.model
//! - model.safetensors (name configurable)

#[cfg(feature = "candle")]
mod candle_impl {
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;
    use std::time::Instant;

    use candle_core::{DType, Device, IndexOp, Module, Tensor, D};
    use candle_nn::{layer_norm, linear, Embedding, LayerNorm, Linear, VarBuilder};
    use sentencepiece::SentencePieceProcessor;
    use serde::Deserialize;

    use nmt_config::ModelSettings;
    use nmt_core::{
        Error, Language, LoadProgress, ModelHandle, ModelLoader, Result, Seq2SeqModel,
        TextTokenizer,
    };

    // Internal result type using candle errors
    type CandleResult<T> = std::result::Result<T, candle_core::Error>;

    fn to_generation_error(e: candle_core::Error) -> Error {
        Error::Generation(format!("Candle error: {}", e))
    }

    const CONFIG_FILE: &str = "config.json";
    const VOCAB_FILE: &str = "vocab.json";
    const SPM_FILE: &str = "sentencepiece.bpe.model";

    /// Language codes in fairseq order; a code's index fixes its token id
    const FAIRSEQ_LANGUAGE_CODES: [&str; 100] = [
        "af", "am", "ar", "ast", "be", "bg", "bn", "br", "bs", "ca", "ceb", "cs", "cy", "da",
        "de", "el", "en", "es", "et", "fa", "ff", "fi", "fr", "fy", "ga", "gd", "gl", "gu", "ha",
        "he", "hi", "hr", "ht", "hu", "hy", "id", "ig", "ilo", "is", "it", "ja", "jv", "ka", "kk",
        "km", "kn", "ko", "lb", "lg", "ln", "lo", "lt", "lv", "mg", "mk", "ml", "mn", "mr", "ms",
        "my", "ne", "nl", "no", "ns", "oc", "or", "pa", "pl", "ps", "pt", "ro", "ru", "sd", "si",
        "sk", "sl", "so", "sq", "sr", "ss", "su", "sv", "sw", "ta", "th", "tl", "tn", "tr", "uk",
        "ur", "uz", "vi", "wo", "xh", "yi", "yo", "zh", "zu",
    ];

    // ========================================================================
    // Configuration
    // ========================================================================

    /// M2M100 model configuration, read from `config.json`
    #[derive(Debug, Clone, Deserialize)]
    pub struct M2m100Config {
        #[serde(default = "default_vocab_size")]
        pub vocab_size: usize,
        #[serde(default = "default_d_model")]
        pub d_model: usize,
        #[serde(default = "default_layers")]
        pub encoder_layers: usize,
        #[serde(default = "default_layers")]
        pub decoder_layers: usize,
        #[serde(default = "default_attention_heads")]
        pub encoder_attention_heads: usize,
        #[serde(default = "default_attention_heads")]
        pub decoder_attention_heads: usize,
        #[serde(default = "default_ffn_dim")]
        pub encoder_ffn_dim: usize,
        #[serde(default = "default_ffn_dim")]
        pub decoder_ffn_dim: usize,
        #[serde(default = "default_max_position_embeddings")]
        pub max_position_embeddings: usize,
        #[serde(default = "default_pad_token_id")]
        pub pad_token_id: u32,
        #[serde(default = "default_eos_token_id")]
        pub eos_token_id: u32,
        #[serde(default = "default_eos_token_id")]
        pub decoder_start_token_id: u32,
        #[serde(default = "default_scale_embedding")]
        pub scale_embedding: bool,
        #[serde(default)]
        pub activation_function: Activation,
        /// Beam width used by `generate`; 1 decodes greedily
        #[serde(default = "default_num_beams")]
        pub num_beams: usize,
        /// Stop as soon as `num_beams` hypotheses have finished
        #[serde(default = "default_early_stopping")]
        pub early_stopping: bool,
        /// Exponent applied to hypothesis length when ranking finished beams
        #[serde(default = "default_length_penalty")]
        pub length_penalty: f64,
    }

    #[derive(Debug, Clone, Copy, Deserialize, Default)]
    #[serde(rename_all = "lowercase")]
    pub enum Activation {
        Gelu,
        #[default]
        Relu,
    }

    fn default_vocab_size() -> usize {
        128112
    }
    fn default_d_model() -> usize {
        1024
    }
    fn default_layers() -> usize {
        12
    }
    fn default_attention_heads() -> usize {
        16
    }
    fn default_ffn_dim() -> usize {
        4096
    }
    fn default_max_position_embeddings() -> usize {
        1024
    }
    fn default_pad_token_id() -> u32 {
        1
    }
    fn default_eos_token_id() -> u32 {
        2
    }
    fn default_scale_embedding() -> bool {
        true
    }
    fn default_num_beams() -> usize {
        5
    }
    fn default_early_stopping() -> bool {
        true
    }
    fn default_length_penalty() -> f64 {
        1.0
    }

    impl Default for M2m100Config {
        fn default() -> Self {
            Self {
                vocab_size: default_vocab_size(),
                d_model: default_d_model(),
                encoder_layers: default_layers(),
                decoder_layers: default_layers(),
                encoder_attention_heads: default_attention_heads(),
                decoder_attention_heads: default_attention_heads(),
                encoder_ffn_dim: default_ffn_dim(),
                decoder_ffn_dim: default_ffn_dim(),
                max_position_embeddings: default_max_position_embeddings(),
                pad_token_id: default_pad_token_id(),
                eos_token_id: default_eos_token_id(),
                decoder_start_token_id: default_eos_token_id(),
                scale_embedding: default_scale_embedding(),
                activation_function: Activation::Relu,
                num_beams: default_num_beams(),
                early_stopping: default_early_stopping(),
                length_penalty: default_length_penalty(),
            }
        }
    }

    impl M2m100Config {
        fn embed_scale(&self) -> f64 {
            if self.scale_embedding {
                (self.d_model as f64).sqrt()
            } else {
                1.0
            }
        }
    }

    // ========================================================================
    // Sinusoidal Positional Embedding
    // ========================================================================

    fn sinusoidal_position_embedding(
        num_positions: usize,
        embed_dim: usize,
        padding_idx: usize,
        device: &Device,
    ) -> CandleResult<Tensor> {
        let half_dim = embed_dim / 2;
        let emb_scale = (10000f64).ln() / (half_dim - 1) as f64;

        let positions: Vec<f32> = (0..num_positions).map(|i| i as f32).collect();
        let dim_scale: Vec<f32> = (0..half_dim)
            .map(|i| (-emb_scale * i as f64).exp() as f32)
            .collect();

        let positions = Tensor::new(positions, device)?.unsqueeze(1)?;
        let dim_scale = Tensor::new(dim_scale, device)?.unsqueeze(0)?;
        let emb = positions.broadcast_mul(&dim_scale)?;

        let mut emb = Tensor::cat(&[&emb.sin()?, &emb.cos()?], 1)?;

        if padding_idx < num_positions {
            let zeros = Tensor::zeros((1, embed_dim), DType::F32, device)?;
            let before = if padding_idx > 0 {
                Some(emb.i(0..padding_idx)?)
            } else {
                None
            };
            let after = if padding_idx < num_positions - 1 {
                Some(emb.i((padding_idx + 1)..)?)
            } else {
                None
            };

            let parts: Vec<&Tensor> = [before.as_ref(), Some(&zeros), after.as_ref()]
                .into_iter()
                .flatten()
                .collect();
            emb = Tensor::cat(&parts, 0)?;
        }

        Ok(emb)
    }

    /// Positions start after the padding index, as in fairseq
    fn make_position_ids(padding_idx: usize, seq_len: usize, device: &Device) -> CandleResult<Tensor> {
        let ids: Vec<u32> = (0..seq_len).map(|i| (padding_idx + 1 + i) as u32).collect();
        Tensor::new(ids.as_slice(), device)
    }

    // ========================================================================
    // Multi-Head Attention
    // ========================================================================

    struct MultiHeadAttention {
        q_proj: Linear,
        k_proj: Linear,
        v_proj: Linear,
        out_proj: Linear,
        num_heads: usize,
        head_dim: usize,
        scale: f64,
    }

    impl MultiHeadAttention {
        fn new(embed_dim: usize, num_heads: usize, vb: VarBuilder) -> CandleResult<Self> {
            let head_dim = embed_dim / num_heads;
            Ok(Self {
                q_proj: linear(embed_dim, embed_dim, vb.pp("q_proj"))?,
                k_proj: linear(embed_dim, embed_dim, vb.pp("k_proj"))?,
                v_proj: linear(embed_dim, embed_dim, vb.pp("v_proj"))?,
                out_proj: linear(embed_dim, embed_dim, vb.pp("out_proj"))?,
                num_heads,
                head_dim,
                scale: (head_dim as f64).powf(-0.5),
            })
        }

        fn forward(
            &self,
            query: &Tensor,
            key_value: &Tensor,
            attention_mask: Option<&Tensor>,
        ) -> CandleResult<Tensor> {
            let (batch_size, tgt_len, _) = query.dims3()?;
            let (_, src_len, _) = key_value.dims3()?;

            let q = self
                .q_proj
                .forward(query)?
                .reshape((batch_size, tgt_len, self.num_heads, self.head_dim))?
                .transpose(1, 2)?
                .contiguous()?;
            let k = self
                .k_proj
                .forward(key_value)?
                .reshape((batch_size, src_len, self.num_heads, self.head_dim))?
                .transpose(1, 2)?
                .contiguous()?;
            let v = self
                .v_proj
                .forward(key_value)?
                .reshape((batch_size, src_len, self.num_heads, self.head_dim))?
                .transpose(1, 2)?
                .contiguous()?;

            let attn_weights = (q.matmul(&k.t()?)? * self.scale)?;
            let attn_weights = match attention_mask {
                Some(mask) => attn_weights.broadcast_add(mask)?,
                None => attn_weights,
            };

            let attn_weights = candle_nn::ops::softmax_last_dim(&attn_weights)?;
            let attn_output = attn_weights.matmul(&v)?;

            let attn_output = attn_output.transpose(1, 2)?.reshape((
                batch_size,
                tgt_len,
                self.num_heads * self.head_dim,
            ))?;

            self.out_proj.forward(&attn_output)
        }
    }

    // ========================================================================
    // Feed-forward block
    // ========================================================================

    struct FeedForward {
        fc1: Linear,
        fc2: Linear,
        activation: Activation,
    }

    impl FeedForward {
        fn new(
            embed_dim: usize,
            ffn_dim: usize,
            activation: Activation,
            vb: &VarBuilder,
        ) -> CandleResult<Self> {
            Ok(Self {
                fc1: linear(embed_dim, ffn_dim, vb.pp("fc1"))?,
                fc2: linear(ffn_dim, embed_dim, vb.pp("fc2"))?,
                activation,
            })
        }

        fn forward(&self, hidden_states: &Tensor) -> CandleResult<Tensor> {
            let hidden_states = self.fc1.forward(hidden_states)?;
            let hidden_states = match self.activation {
                Activation::Gelu => hidden_states.gelu()?,
                Activation::Relu => hidden_states.relu()?,
            };
            self.fc2.forward(&hidden_states)
        }
    }

    // ========================================================================
    // Encoder Layer (pre-norm)
    // ========================================================================

    struct EncoderLayer {
        self_attn: MultiHeadAttention,
        self_attn_layer_norm: LayerNorm,
        ffn: FeedForward,
        final_layer_norm: LayerNorm,
    }

    impl EncoderLayer {
        fn new(config: &M2m100Config, vb: VarBuilder) -> CandleResult<Self> {
            let embed_dim = config.d_model;
            Ok(Self {
                self_attn: MultiHeadAttention::new(
                    embed_dim,
                    config.encoder_attention_heads,
                    vb.pp("self_attn"),
                )?,
                self_attn_layer_norm: layer_norm(embed_dim, 1e-5, vb.pp("self_attn_layer_norm"))?,
                ffn: FeedForward::new(
                    embed_dim,
                    config.encoder_ffn_dim,
                    config.activation_function,
                    &vb,
                )?,
                final_layer_norm: layer_norm(embed_dim, 1e-5, vb.pp("final_layer_norm"))?,
            })
        }

        fn forward(&self, hidden_states: &Tensor) -> CandleResult<Tensor> {
            let residual = hidden_states;
            let normed = self.self_attn_layer_norm.forward(hidden_states)?;
            let attn = self.self_attn.forward(&normed, &normed, None)?;
            let hidden_states = (residual + attn)?;

            let normed = self.final_layer_norm.forward(&hidden_states)?;
            let ffn = self.ffn.forward(&normed)?;
            hidden_states + ffn
        }
    }

    // ========================================================================
    // Decoder Layer (pre-norm)
    // ========================================================================

    struct DecoderLayer {
        self_attn: MultiHeadAttention,
        self_attn_layer_norm: LayerNorm,
        encoder_attn: MultiHeadAttention,
        encoder_attn_layer_norm: LayerNorm,
        ffn: FeedForward,
        final_layer_norm: LayerNorm,
    }

    impl DecoderLayer {
        fn new(config: &M2m100Config, vb: VarBuilder) -> CandleResult<Self> {
            let embed_dim = config.d_model;
            Ok(Self {
                self_attn: MultiHeadAttention::new(
                    embed_dim,
                    config.decoder_attention_heads,
                    vb.pp("self_attn"),
                )?,
                self_attn_layer_norm: layer_norm(embed_dim, 1e-5, vb.pp("self_attn_layer_norm"))?,
                encoder_attn: MultiHeadAttention::new(
                    embed_dim,
                    config.decoder_attention_heads,
                    vb.pp("encoder_attn"),
                )?,
                encoder_attn_layer_norm: layer_norm(
                    embed_dim,
                    1e-5,
                    vb.pp("encoder_attn_layer_norm"),
                )?,
                ffn: FeedForward::new(
                    embed_dim,
                    config.decoder_ffn_dim,
                    config.activation_function,
                    &vb,
                )?,
                final_layer_norm: layer_norm(embed_dim, 1e-5, vb.pp("final_layer_norm"))?,
            })
        }

        fn forward(
            &self,
            hidden_states: &Tensor,
            encoder_hidden_states: &Tensor,
            causal_mask: &Tensor,
        ) -> CandleResult<Tensor> {
            let normed = self.self_attn_layer_norm.forward(hidden_states)?;
            let attn = self.self_attn.forward(&normed, &normed, Some(causal_mask))?;
            let hidden_states = (hidden_states + attn)?;

            let normed = self.encoder_attn_layer_norm.forward(&hidden_states)?;
            let cross = self.encoder_attn.forward(&normed, encoder_hidden_states, None)?;
            let hidden_states = (hidden_states + cross)?;

            let normed = self.final_layer_norm.forward(&hidden_states)?;
            let ffn = self.ffn.forward(&normed)?;
            hidden_states + ffn
        }
    }

    // ========================================================================
    // Encoder
    // ========================================================================

    struct Encoder {
        embed_tokens: Embedding,
        embed_positions: Tensor,
        embed_scale: f64,
        layers: Vec<EncoderLayer>,
        layer_norm: LayerNorm,
        padding_idx: usize,
    }

    impl Encoder {
        fn new(
            config: &M2m100Config,
            embed_tokens: Embedding,
            vb: VarBuilder,
            device: &Device,
        ) -> CandleResult<Self> {
            let padding_idx = config.pad_token_id as usize;
            let embed_positions = sinusoidal_position_embedding(
                config.max_position_embeddings + padding_idx + 1,
                config.d_model,
                padding_idx,
                device,
            )?;

            let layers: Vec<_> = (0..config.encoder_layers)
                .map(|i| EncoderLayer::new(config, vb.pp(format!("layers.{}", i))))
                .collect::<CandleResult<_>>()?;

            Ok(Self {
                embed_tokens,
                embed_positions,
                embed_scale: config.embed_scale(),
                layers,
                layer_norm: layer_norm(config.d_model, 1e-5, vb.pp("layer_norm"))?,
                padding_idx,
            })
        }

        fn forward(&self, input_ids: &Tensor) -> CandleResult<Tensor> {
            let (_, seq_len) = input_ids.dims2()?;

            let inputs_embeds = (self.embed_tokens.forward(input_ids)? * self.embed_scale)?;
            let position_ids = make_position_ids(self.padding_idx, seq_len, input_ids.device())?;
            let positions = self.embed_positions.index_select(&position_ids, 0)?;

            let mut hidden_states = inputs_embeds.broadcast_add(&positions.unsqueeze(0)?)?;
            for layer in &self.layers {
                hidden_states = layer.forward(&hidden_states)?;
            }

            self.layer_norm.forward(&hidden_states)
        }
    }

    // ========================================================================
    // Decoder
    // ========================================================================

    struct Decoder {
        embed_tokens: Embedding,
        embed_positions: Tensor,
        embed_scale: f64,
        layers: Vec<DecoderLayer>,
        layer_norm: LayerNorm,
        padding_idx: usize,
    }

    impl Decoder {
        fn new(
            config: &M2m100Config,
            embed_tokens: Embedding,
            vb: VarBuilder,
            device: &Device,
        ) -> CandleResult<Self> {
            let padding_idx = config.pad_token_id as usize;
            let embed_positions = sinusoidal_position_embedding(
                config.max_position_embeddings + padding_idx + 1,
                config.d_model,
                padding_idx,
                device,
            )?;

            let layers: Vec<_> = (0..config.decoder_layers)
                .map(|i| DecoderLayer::new(config, vb.pp(format!("layers.{}", i))))
                .collect::<CandleResult<_>>()?;

            Ok(Self {
                embed_tokens,
                embed_positions,
                embed_scale: config.embed_scale(),
                layers,
                layer_norm: layer_norm(config.d_model, 1e-5, vb.pp("layer_norm"))?,
                padding_idx,
            })
        }

        fn forward(&self, input_ids: &Tensor, encoder_hidden_states: &Tensor) -> CandleResult<Tensor> {
            let (_, seq_len) = input_ids.dims2()?;

            let inputs_embeds = (self.embed_tokens.forward(input_ids)? * self.embed_scale)?;
            let position_ids = make_position_ids(self.padding_idx, seq_len, input_ids.device())?;
            let positions = self.embed_positions.index_select(&position_ids, 0)?;

            let mut hidden_states = inputs_embeds.broadcast_add(&positions.unsqueeze(0)?)?;
            let causal_mask = create_causal_mask(seq_len, input_ids.device())?;

            for layer in &self.layers {
                hidden_states = layer.forward(&hidden_states, encoder_hidden_states, &causal_mask)?;
            }

            self.layer_norm.forward(&hidden_states)
        }
    }

    fn create_causal_mask(seq_len: usize, device: &Device) -> CandleResult<Tensor> {
        // Future positions become -inf
        let mask_data: Vec<f32> = (0..seq_len)
            .flat_map(|i| (0..seq_len).map(move |j| if j > i { f32::NEG_INFINITY } else { 0.0 }))
            .collect();
        Tensor::from_vec(mask_data, (seq_len, seq_len), device)?
            .unsqueeze(0)?
            .unsqueeze(0)
    }

    // ========================================================================
    // Full Model
    // ========================================================================

    /// M2M100 encoder-decoder with an LM head tied to the shared embedding
    pub struct M2m100Model {
        encoder: Encoder,
        decoder: Decoder,
        lm_head: Linear,
        config: M2m100Config,
        device: Device,
    }

    impl M2m100Model {
        pub fn new(config: M2m100Config, vb: VarBuilder, device: &Device) -> CandleResult<Self> {
            let shared_name = if vb.contains_tensor("model.shared.weight") {
                "model.shared"
            } else {
                "model.encoder.embed_tokens"
            };
            let shared = vb
                .pp(shared_name)
                .get((config.vocab_size, config.d_model), "weight")?;

            let embed_tokens = Embedding::new(shared.clone(), config.d_model);

            Ok(Self {
                encoder: Encoder::new(&config, embed_tokens.clone(), vb.pp("model.encoder"), device)?,
                decoder: Decoder::new(&config, embed_tokens, vb.pp("model.decoder"), device)?,
                lm_head: Linear::new(shared, None),
                config,
                device: device.clone(),
            })
        }

        fn generate_ids(
            &self,
            input_ids: &[u32],
            forced_bos_token_id: u32,
            max_length: usize,
        ) -> CandleResult<Vec<u32>> {
            let input = Tensor::new(input_ids, &self.device)?.unsqueeze(0)?;
            let encoder_output = self.encoder.forward(&input)?;

            if self.config.num_beams <= 1 {
                return self.greedy(&encoder_output, forced_bos_token_id, max_length);
            }

            beam_search(
                vec![self.config.decoder_start_token_id, forced_bos_token_id],
                BeamConfig {
                    eos_token_id: self.config.eos_token_id,
                    num_beams: self.config.num_beams,
                    max_length,
                    early_stopping: self.config.early_stopping,
                    length_penalty: self.config.length_penalty as f32,
                },
                |sequences| self.next_token_log_probs(sequences, &encoder_output),
            )
        }

        fn greedy(
            &self,
            encoder_output: &Tensor,
            forced_bos_token_id: u32,
            max_length: usize,
        ) -> CandleResult<Vec<u32>> {
            let mut output_ids = vec![self.config.decoder_start_token_id];

            while output_ids.len() < max_length {
                let next_token = if output_ids.len() == 1 {
                    forced_bos_token_id
                } else {
                    let decoder_input = Tensor::new(output_ids.as_slice(), &self.device)?.unsqueeze(0)?;
                    let hidden_states = self.decoder.forward(&decoder_input, encoder_output)?;
                    let logits = self.lm_head.forward(&hidden_states)?;
                    let last_logits = logits.i((0, output_ids.len() - 1))?;
                    last_logits.argmax(D::Minus1)?.to_scalar::<u32>()?
                };

                output_ids.push(next_token);
                if next_token == self.config.eos_token_id {
                    break;
                }
            }

            Ok(output_ids)
        }

        /// Log-probabilities of the next token for each running beam
        fn next_token_log_probs(
            &self,
            sequences: &[Vec<u32>],
            encoder_output: &Tensor,
        ) -> CandleResult<Vec<Vec<f32>>> {
            let num_seqs = sequences.len();
            let seq_len = sequences.first().map(Vec::len).unwrap_or(0);
            let decoder_input = Tensor::from_vec(sequences.concat(), (num_seqs, seq_len), &self.device)?;

            let (_, src_len, d_model) = encoder_output.dims3()?;
            let encoder_states = encoder_output
                .broadcast_as((num_seqs, src_len, d_model))?
                .contiguous()?;

            let hidden_states = self.decoder.forward(&decoder_input, &encoder_states)?;
            let last_hidden = hidden_states.i((.., seq_len - 1, ..))?.contiguous()?;
            let logits = self.lm_head.forward(&last_hidden)?;

            candle_nn::ops::log_softmax(&logits, D::Minus1)?
                .to_dtype(DType::F32)?
                .to_vec2::<f32>()
        }
    }

    // ========================================================================
    // Beam search
    // ========================================================================

    #[derive(Debug, Clone, Copy)]
    struct BeamConfig {
        eos_token_id: u32,
        num_beams: usize,
        max_length: usize,
        early_stopping: bool,
        length_penalty: f32,
    }

    struct Hypothesis {
        tokens: Vec<u32>,
        score: f32,
    }

    /// Beam search from a fixed decoder prefix
    ///
    /// `step` receives the running sequences (all of equal length) and returns
    /// one row of next-token log-probabilities per sequence. Finished
    /// hypotheses are ranked by summed log-probability divided by
    /// `len ^ length_penalty`, with `len` counting the decoder start token.
    fn beam_search<E, F>(
        prefix: Vec<u32>,
        config: BeamConfig,
        mut step: F,
    ) -> std::result::Result<Vec<u32>, E>
    where
        F: FnMut(&[Vec<u32>]) -> std::result::Result<Vec<Vec<f32>>, E>,
    {
        let BeamConfig {
            eos_token_id,
            num_beams,
            max_length,
            early_stopping,
            length_penalty,
        } = config;

        if prefix.len() >= max_length {
            let mut tokens = prefix;
            tokens.truncate(max_length);
            return Ok(tokens);
        }

        let normalize = |score: f32, len: usize| score / (len as f32).powf(length_penalty);
        let mut running = vec![Hypothesis {
            tokens: prefix,
            score: 0.0,
        }];
        let mut finished: Vec<Hypothesis> = Vec::with_capacity(num_beams + 1);
        let mut done = false;

        while running[0].tokens.len() < max_length {
            let sequences: Vec<Vec<u32>> = running.iter().map(|h| h.tokens.clone()).collect();
            let log_probs = step(&sequences)?;

            let mut candidates: Vec<(f32, usize, u32)> = running
                .iter()
                .zip(&log_probs)
                .enumerate()
                .flat_map(|(beam_idx, (hyp, row))| {
                    top_k(row, 2 * num_beams)
                        .into_iter()
                        .map(move |(token, log_prob)| (hyp.score + log_prob, beam_idx, token))
                })
                .collect();
            candidates.sort_by(|a, b| b.0.total_cmp(&a.0));

            let mut next = Vec::with_capacity(num_beams);
            for (rank, (score, beam_idx, token)) in
                candidates.into_iter().take(2 * num_beams).enumerate()
            {
                let mut tokens = running[beam_idx].tokens.clone();
                tokens.push(token);

                if token == eos_token_id {
                    // An eos outside the top `num_beams` never finishes a beam
                    if rank < num_beams {
                        let len = tokens.len();
                        add_finished(
                            &mut finished,
                            Hypothesis {
                                tokens,
                                score: normalize(score, len),
                            },
                            num_beams,
                        );
                    }
                } else {
                    next.push(Hypothesis { tokens, score });
                }

                if next.len() == num_beams {
                    break;
                }
            }

            if next.is_empty() {
                done = true;
                break;
            }
            running = next;

            if finished.len() >= num_beams {
                let best_running = normalize(running[0].score, running[0].tokens.len());
                let worst_finished = finished
                    .iter()
                    .map(|h| h.score)
                    .fold(f32::INFINITY, f32::min);
                if early_stopping || worst_finished >= best_running {
                    done = true;
                    break;
                }
            }
        }

        if !done {
            for hyp in running {
                let len = hyp.tokens.len();
                add_finished(
                    &mut finished,
                    Hypothesis {
                        tokens: hyp.tokens,
                        score: normalize(hyp.score, len),
                    },
                    num_beams,
                );
            }
        }

        Ok(finished
            .into_iter()
            .max_by(|a, b| a.score.total_cmp(&b.score))
            .map(|h| h.tokens)
            .unwrap_or_default())
    }

    /// Keep the best `capacity` finished hypotheses
    fn add_finished(finished: &mut Vec<Hypothesis>, hyp: Hypothesis, capacity: usize) {
        finished.push(hyp);
        if finished.len() > capacity {
            if let Some(worst) = finished
                .iter()
                .enumerate()
                .min_by(|a, b| a.1.score.total_cmp(&b.1.score))
                .map(|(idx, _)| idx)
            {
                finished.swap_remove(worst);
            }
        }
    }

    /// Highest `k` entries of `row` as `(token, value)`, best first
    fn top_k(row: &[f32], k: usize) -> Vec<(u32, f32)> {
        let mut indexed: Vec<(u32, f32)> = row
            .iter()
            .enumerate()
            .map(|(idx, &value)| (idx as u32, value))
            .collect();
        let k = k.min(indexed.len());
        if k == 0 {
            return Vec::new();
        }
        if k < indexed.len() {
            indexed.select_nth_unstable_by(k - 1, |a, b| b.1.total_cmp(&a.1));
            indexed.truncate(k);
        }
        indexed.sort_by(|a, b| b.1.total_cmp(&a.1));
        indexed
    }

    impl Seq2SeqModel for M2m100Model {
        fn generate(
            &self,
            input_ids: &[u32],
            forced_bos_token_id: u32,
            max_length: usize,
        ) -> Result<Vec<u32>> {
            if input_ids.is_empty() {
                return Err(Error::Generation("empty input sequence".to_string()));
            }
            self.generate_ids(input_ids, forced_bos_token_id, max_length)
                .map_err(to_generation_error)
        }

        fn name(&self) -> &str {
            "m2m100-candle"
        }
    }

    // ========================================================================
    // Vocabulary
    // ========================================================================

    /// Token/id tables, language tokens included
    pub struct M2m100Vocab {
        vocab: HashMap<String, u32>,
        vocab_rev: HashMap<u32, String>,
        lang_ids: HashMap<Language, u32>,
        unk_token_id: u32,
        special_ids: Vec<u32>,
    }

    impl M2m100Vocab {
        pub fn new(vocab: HashMap<String, u32>) -> Self {
            let mut vocab_rev: HashMap<u32, String> =
                vocab.iter().map(|(k, v)| (*v, k.clone())).collect();

            let base = vocab.len() as u32;
            let mut lang_ids = HashMap::new();
            for (index, code) in FAIRSEQ_LANGUAGE_CODES.iter().enumerate() {
                let token = format!("__{}__", code);
                let id = vocab.get(&token).copied().unwrap_or(base + index as u32);
                if let Some(lang) = Language::from_str_loose(code) {
                    lang_ids.insert(lang, id);
                }
                vocab_rev.entry(id).or_insert(token);
            }

            let special_ids = ["<s>", "<pad>", "</s>", "<unk>"]
                .iter()
                .enumerate()
                .map(|(fallback, token)| vocab.get(*token).copied().unwrap_or(fallback as u32))
                .collect::<Vec<_>>();
            let unk_token_id = special_ids[3];

            Self {
                vocab,
                vocab_rev,
                lang_ids,
                unk_token_id,
                special_ids,
            }
        }

        pub fn lang_token_id(&self, lang: Language) -> Result<u32> {
            self.lang_ids
                .get(&lang)
                .copied()
                .ok_or(Error::UnsupportedLanguage(lang))
        }

        fn eos_token_id(&self) -> u32 {
            self.special_ids[2]
        }

        fn is_special(&self, id: u32) -> bool {
            self.special_ids.contains(&id) || self.lang_ids.values().any(|&l| l == id)
        }

        /// `[__src__, pieces…, </s>]`
        pub fn encode_pieces<'a>(
            &self,
            pieces: impl IntoIterator<Item = &'a str>,
            src_lang: Language,
        ) -> Result<Vec<u32>> {
            let mut ids = vec![self.lang_token_id(src_lang)?];
            ids.extend(
                pieces
                    .into_iter()
                    .map(|piece| self.vocab.get(piece).copied().unwrap_or(self.unk_token_id)),
            );
            ids.push(self.eos_token_id());
            Ok(ids)
        }

        pub fn decode(&self, ids: &[u32], skip_special_tokens: bool) -> String {
            let text: String = ids
                .iter()
                .filter(|&&id| !(skip_special_tokens && self.is_special(id)))
                .map(|id| self.vocab_rev.get(id).map(String::as_str).unwrap_or("<unk>"))
                .collect();

            text.replace('▁', " ").trim().to_string()
        }
    }

    // ========================================================================
    // Tokenizer Wrapper
    // ========================================================================

    /// SentencePiece segmentation over the fairseq vocabulary
    pub struct M2m100Tokenizer {
        spm: SentencePieceProcessor,
        vocab: M2m100Vocab,
    }

    impl M2m100Tokenizer {
        pub fn from_files(spm_path: &Path, vocab_path: &Path) -> Result<Self> {
            let spm = SentencePieceProcessor::open(spm_path)
                .map_err(|e| Error::model_load(format!("Failed to load SPM model: {}", e)))?;

            let vocab: HashMap<String, u32> =
                serde_json::from_str(&std::fs::read_to_string(vocab_path)?)
                    .map_err(|e| Error::model_load(format!("Failed to parse vocab: {}", e)))?;

            tracing::debug!(entries = vocab.len(), "Loaded M2M100 vocabulary");

            Ok(Self {
                spm,
                vocab: M2m100Vocab::new(vocab),
            })
        }
    }

    impl TextTokenizer for M2m100Tokenizer {
        fn encode(&self, text: &str, src_lang: Language) -> Result<Vec<u32>> {
            let pieces = self
                .spm
                .encode(text)
                .map_err(|e| Error::Tokenization(format!("SPM encode failed: {}", e)))?;

            self.vocab
                .encode_pieces(pieces.iter().map(|p| p.piece.as_str()), src_lang)
        }

        fn lang_token_id(&self, lang: Language) -> Result<u32> {
            self.vocab.lang_token_id(lang)
        }

        fn decode(&self, ids: &[u32], skip_special_tokens: bool) -> Result<String> {
            Ok(self.vocab.decode(ids, skip_special_tokens))
        }
    }

    // ========================================================================
    // Loader
    // ========================================================================

    /// Where the model files live
    #[derive(Debug, Clone)]
    pub enum ModelSource {
        Hub {
            model_id: String,
            revision: String,
            cache_dir: Option<PathBuf>,
        },
        Local(PathBuf),
    }

    struct ModelFiles {
        config: PathBuf,
        vocab: PathBuf,
        spm: PathBuf,
        weights: PathBuf,
    }

    /// Loads M2M100 weights and tokenizer
    pub struct M2m100Loader {
        source: ModelSource,
        weights_file: String,
        device: Device,
        label: String,
    }

    impl M2m100Loader {
        pub fn new(source: ModelSource, weights_file: impl Into<String>) -> Self {
            let label = match &source {
                ModelSource::Hub { model_id, .. } => model_id.clone(),
                ModelSource::Local(path) => path.display().to_string(),
            };
            Self {
                source,
                weights_file: weights_file.into(),
                device: Device::Cpu,
                label,
            }
        }

        pub fn from_settings(settings: &ModelSettings) -> Self {
            let source = match &settings.local_path {
                Some(path) => ModelSource::Local(path.clone()),
                None => ModelSource::Hub {
                    model_id: settings.model_id.clone(),
                    revision: settings.revision.clone(),
                    cache_dir: settings.cache_dir.clone(),
                },
            };
            Self::new(source, settings.weights_file.clone())
        }

        fn resolve_files(&self) -> Result<ModelFiles> {
            match &self.source {
                ModelSource::Local(dir) => {
                    let files = ModelFiles {
                        config: dir.join(CONFIG_FILE),
                        vocab: dir.join(VOCAB_FILE),
                        spm: dir.join(SPM_FILE),
                        weights: dir.join(&self.weights_file),
                    };
                    for path in [&files.config, &files.vocab, &files.spm, &files.weights] {
                        if !path.exists() {
                            return Err(Error::model_load(format!(
                                "Missing model file: {}",
                                path.display()
                            )));
                        }
                    }
                    Ok(files)
                }
                ModelSource::Hub {
                    model_id,
                    revision,
                    cache_dir,
                } => {
                    use hf_hub::api::sync::ApiBuilder;
                    use hf_hub::{Repo, RepoType};

                    let mut builder = ApiBuilder::new().with_progress(false);
                    if let Some(dir) = cache_dir {
                        builder = builder.with_cache_dir(dir.clone());
                    }
                    let api = builder
                        .build()
                        .map_err(|e| Error::model_load(format!("Hub client error: {}", e)))?;
                    let repo = api.repo(Repo::with_revision(
                        model_id.clone(),
                        RepoType::Model,
                        revision.clone(),
                    ));

                    let fetch = |name: &str| {
                        repo.get(name).map_err(|e| {
                            Error::model_load(format!("Failed to fetch {}/{}: {}", model_id, name, e))
                        })
                    };

                    Ok(ModelFiles {
                        config: fetch(CONFIG_FILE)?,
                        vocab: fetch(VOCAB_FILE)?,
                        spm: fetch(SPM_FILE)?,
                        weights: fetch(&self.weights_file)?,
                    })
                }
            }
        }

        fn load_model(&self, files: &ModelFiles) -> Result<M2m100Model> {
            let config: M2m100Config =
                serde_json::from_str(&std::fs::read_to_string(&files.config)?)
                    .map_err(|e| Error::model_load(format!("Failed to parse config: {}", e)))?;

            let tensors = candle_core::safetensors::load(&files.weights, &self.device)
                .map_err(|e| Error::model_load(format!("Failed to load weights: {}", e)))?;
            let vb = VarBuilder::from_tensors(tensors, DType::F32, &self.device);

            M2m100Model::new(config, vb, &self.device)
                .map_err(|e| Error::model_load(format!("Failed to build model: {}", e)))
        }
    }

    impl ModelLoader for M2m100Loader {
        fn load(&self, progress: &dyn Fn(LoadProgress)) -> Result<ModelHandle> {
            let start = Instant::now();
            progress(LoadProgress::Starting);

            progress(LoadProgress::FetchingFiles);
            tracing::info!(model = %self.label, "Resolving M2M100 model files");
            let files = self.resolve_files()?;

            progress(LoadProgress::LoadingTokenizer);
            let tokenizer = M2m100Tokenizer::from_files(&files.spm, &files.vocab)?;

            progress(LoadProgress::LoadingWeights);
            tracing::info!(weights = ?files.weights, "Loading M2M100 weights");
            let model = self.load_model(&files)?;

            progress(LoadProgress::Ready);
            tracing::info!(
                model = %self.label,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "M2M100 model ready"
            );

            Ok(ModelHandle::new(Arc::new(model), Arc::new(tokenizer)))
        }

        fn model_id(&self) -> &str {
            &self.label
        }
    }

}

#[cfg(feature = "candle")]
pub use candle_impl::{
    M2m100Config, M2m100Loader, M2m100Model, M2m100Tokenizer, M2m100Vocab, ModelSource,
};
