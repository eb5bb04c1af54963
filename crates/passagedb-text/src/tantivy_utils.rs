use tantivy::schema::{Field, IndexRecordOption, Schema, TextFieldIndexing, TextOptions, STORED, STRING};
use tantivy::tokenizer::{LowerCaser, SimpleTokenizer, StopWordFilter, TextAnalyzer};
use tantivy::Index;

pub const TOKENIZER_NAME: &str = "text_with_stopwords";

const STOP_WORDS: &[&str] = &[
	"a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "in", "is", "it", "its", "of", "on", "that",
	"the", "to", "was", "were", "will", "with", "or", "but", "not", "this", "these", "they", "their", "there", "then",
	"than", "so", "if", "we", "our", "which", "can", "could", "should", "would", "may", "do", "does", "have", "had",
];

#[derive(Debug, Clone, Copy)]
pub struct Fields {
	pub chunk_id: Field,
	pub doc_id: Field,
	pub text: Field,
	pub section: Field,
}

impl Fields {
	pub fn from_schema(schema: &Schema) -> tantivy::Result<Self> {
		Ok(Self {
			chunk_id: schema.get_field("chunk_id")?,
			doc_id: schema.get_field("doc_id")?,
			text: schema.get_field("text")?,
			section: schema.get_field("section")?,
		})
	}
}

pub fn build_schema() -> Schema {
	let mut schema_builder = Schema::builder();
	schema_builder.add_text_field("chunk_id", STRING | STORED);
	schema_builder.add_text_field("doc_id", STRING | STORED);
	let text_indexing = TextFieldIndexing::default()
		.set_tokenizer(TOKENIZER_NAME)
		.set_index_option(IndexRecordOption::WithFreqsAndPositions);
	schema_builder.add_text_field("text", TextOptions::default().set_indexing_options(text_indexing).set_stored());
	schema_builder.add_text_field("section", STRING | STORED);
	schema_builder.build()
}

/// Must run on every open: tokenizers are not persisted with the index.
pub fn register_tokenizer(index: &Index) {
	let tokenizer = TextAnalyzer::builder(SimpleTokenizer::default())
		.filter(LowerCaser)
		.filter(StopWordFilter::remove(STOP_WORDS.iter().map(|s| s.to_string())))
		.build();
	index.tokenizers().register(TOKENIZER_NAME, tokenizer);
}
