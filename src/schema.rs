diesel::table! {
    participant_summary (participant_id) {
        participant_id -> Int8,
        biobank_id -> Text,
        sex_at_birth -> Nullable<Text>,
        cohort -> Int4,
        consent_for_genomics_ror -> Int4,
        withdrawal_status -> Int4,
    }
}

diesel::table! {
    biobank_stored_sample (id) {
        id -> Int8,
        biobank_stored_sample_id -> Text,
        biobank_id -> Text,
        test -> Text,
        status -> Text,
        collection_method -> Nullable<Text>,
        confirmed_date -> Nullable<Timestamp>,
    }
}

diesel::table! {
    genomic_set (id) {
        id -> Int8,
        name -> Text,
        version -> Int4,
        created -> Timestamp,
    }
}

diesel::table! {
    genomic_job_run (id) {
        id -> Int8,
        job -> Text,
        start_time -> Timestamp,
        end_time -> Nullable<Timestamp>,
        run_status -> Text,
        run_result -> Nullable<Text>,
    }
}

diesel::table! {
    genomic_manifest_file (id) {
        id -> Int8,
        manifest_type -> Text,
        bucket_name -> Text,
        file_path -> Text,
        record_count -> Int4,
        upload_date -> Nullable<Timestamp>,
        created -> Timestamp,
    }
}

diesel::table! {
    genomic_manifest_feedback (id) {
        id -> Int8,
        input_manifest_file_id -> Int8,
        feedback_record_count -> Int4,
        feedback_complete -> Bool,
        created -> Timestamp,
        modified -> Timestamp,
    }
}

diesel::table! {
    genomic_file_processed (id) {
        id -> Int8,
        run_id -> Int8,
        genomic_manifest_file_id -> Nullable<Int8>,
        bucket_name -> Text,
        file_path -> Text,
        file_name -> Text,
        upload_date -> Nullable<Timestamp>,
        file_status -> Text,
        file_result -> Nullable<Text>,
    }
}

diesel::table! {
    genomic_set_member (id) {
        id -> Int8,
        genomic_set_id -> Int8,
        participant_id -> Int8,
        biobank_id -> Text,
        collection_tube_id -> Nullable<Text>,
        sample_id -> Nullable<Text>,
        parent_sample_id -> Nullable<Text>,
        genome_type -> Text,
        sex_at_birth -> Nullable<Text>,
        ny_flag -> Bool,
        genomic_workflow_state -> Int4,
        genomic_workflow_state_str -> Text,
        genomic_workflow_state_modified -> Timestamp,
        gc_site_id -> Nullable<Text>,
        package_id -> Nullable<Text>,
        box_storageunit_id -> Nullable<Text>,
        box_plate_id -> Nullable<Text>,
        well_position -> Nullable<Text>,
        sample_type -> Nullable<Text>,
        treatments -> Nullable<Text>,
        quantity_ul -> Nullable<Text>,
        total_concentration_ng_per_ul -> Nullable<Text>,
        total_dna_ng -> Nullable<Text>,
        visit_description -> Nullable<Text>,
        sample_source -> Nullable<Text>,
        study -> Nullable<Text>,
        tracking_number -> Nullable<Text>,
        contact -> Nullable<Text>,
        email -> Nullable<Text>,
        study_pi -> Nullable<Text>,
        site_name -> Nullable<Text>,
        failure_mode -> Nullable<Text>,
        failure_mode_desc -> Nullable<Text>,
        gem_pass -> Nullable<Text>,
        block_research -> Bool,
        block_research_reason -> Nullable<Text>,
        block_results -> Bool,
        block_results_reason -> Nullable<Text>,
        diversion_pouch -> Bool,
        aw0_manifest_file_id -> Nullable<Int8>,
        aw1_file_processed_id -> Nullable<Int8>,
        aw2_file_processed_id -> Nullable<Int8>,
        gem_a1_manifest_job_run_id -> Nullable<Int8>,
        gem_a2_manifest_job_run_id -> Nullable<Int8>,
        aw3_manifest_job_run_id -> Nullable<Int8>,
        aw4_manifest_job_run_id -> Nullable<Int8>,
        created -> Timestamp,
        modified -> Timestamp,
    }
}

diesel::table! {
    genomic_gc_validation_metrics (id) {
        id -> Int8,
        genomic_set_member_id -> Int8,
        genomic_file_processed_id -> Nullable<Int8>,
        pipeline_id -> Nullable<Text>,
        chipwellbarcode -> Nullable<Text>,
        lims_id -> Nullable<Text>,
        #[max_length = 10]
        call_rate -> Nullable<Varchar>,
        #[max_length = 10]
        mapped_reads_pct -> Nullable<Varchar>,
        mean_coverage -> Nullable<Float8>,
        genome_coverage -> Nullable<Float8>,
        aligned_q30_bases -> Nullable<Int8>,
        contamination -> Nullable<Float8>,
        contamination_category -> Nullable<Text>,
        sex_concordance -> Nullable<Text>,
        sex_ploidy -> Nullable<Text>,
        array_concordance -> Nullable<Text>,
        processing_status -> Nullable<Text>,
        notes -> Nullable<Text>,
        site_id -> Nullable<Text>,
        idat_red_received -> Bool,
        idat_red_path -> Nullable<Text>,
        idat_red_deleted -> Bool,
        idat_green_received -> Bool,
        idat_green_path -> Nullable<Text>,
        idat_green_deleted -> Bool,
        vcf_received -> Bool,
        vcf_path -> Nullable<Text>,
        vcf_deleted -> Bool,
        cram_received -> Bool,
        cram_path -> Nullable<Text>,
        cram_deleted -> Bool,
        crai_received -> Bool,
        crai_path -> Nullable<Text>,
        crai_deleted -> Bool,
        hf_vcf_received -> Bool,
        hf_vcf_path -> Nullable<Text>,
        hf_vcf_deleted -> Bool,
        drc_sex_concordance -> Nullable<Text>,
        drc_contamination -> Nullable<Text>,
        drc_call_rate -> Nullable<Text>,
        drc_fp_concordance -> Nullable<Text>,
        qc_status -> Nullable<Text>,
        ignore_flag -> Bool,
        created -> Timestamp,
        modified -> Timestamp,
    }
}

diesel::table! {
    genomic_incident (id) {
        id -> Int8,
        code -> Text,
        message -> Text,
        status -> Text,
        source_job_run_id -> Nullable<Int8>,
        source_file_processed_id -> Nullable<Int8>,
        participant_id -> Nullable<Int8>,
        biobank_id -> Nullable<Text>,
        sample_id -> Nullable<Text>,
        collection_tube_id -> Nullable<Text>,
        slack_notification -> Bool,
        slack_notification_date -> Nullable<Timestamp>,
        created -> Timestamp,
    }
}

diesel::table! {
    genomic_sample_contamination (id) {
        id -> Int8,
        sample_id -> Text,
        failed_in_job -> Text,
        created -> Timestamp,
    }
}

diesel::joinable!(genomic_set_member -> genomic_set (genomic_set_id));
diesel::joinable!(genomic_gc_validation_metrics -> genomic_set_member (genomic_set_member_id));
diesel::joinable!(genomic_manifest_feedback -> genomic_manifest_file (input_manifest_file_id));
diesel::joinable!(genomic_file_processed -> genomic_job_run (run_id));

diesel::allow_tables_to_appear_in_same_query!(
    participant_summary,
    biobank_stored_sample,
    genomic_set,
    genomic_job_run,
    genomic_manifest_file,
    genomic_manifest_feedback,
    genomic_file_processed,
    genomic_set_member,
    genomic_gc_validation_metrics,
    genomic_incident,
    genomic_sample_contamination,
);
