//! Embed a few manual-style sentences with a built-in fastembed model

use manual_qa_embed::{EmbedConfig, EmbeddingProvider, FastEmbedProvider};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let temp_dir = tempfile::tempdir()?;
    let config = EmbedConfig::default()
        .with_model_base_path(temp_dir.path())
        .with_batch_size(2)
        .with_download_progress(true);

    let provider = FastEmbedProvider::new(config);
    println!("Model: {} (loaded: {})", provider.model_name(), provider.is_loaded());

    let texts = vec![
        "Check the engine oil level with the dipstick.".to_string(),
        "Recommended tyre pressure is 32 PSI.".to_string(),
        "Replace the cabin air filter every 15,000 km.".to_string(),
    ];
    let result = provider.embed_texts(&texts).await?;

    println!(
        "Generated {} embeddings of dimension {}",
        result.len(),
        result.dimension
    );
    for (text, embedding) in texts.iter().zip(&result.embeddings) {
        println!("  {text:<50} {:?}", &embedding[..4.min(embedding.len())]);
    }

    Ok(())
}
