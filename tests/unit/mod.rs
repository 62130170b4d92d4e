mod extractor_rows;
